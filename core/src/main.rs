use clap::Parser;
use log::error;
use medanon_core::cli::report::{InPlaceTextReport, TextReport};
use medanon_core::cli::{Cli, Command, OutputFormat};
use medanon_core::pipeline::{run, run_in_place};
use medanon_core::CancelToken;
use std::process;

fn main() {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    let cancel = CancelToken::new();
    let code = match &cli.command {
        Command::Export(args) => {
            let config = args.to_config(!cli.quiet);
            match run(&config, &cancel) {
                Ok(summary) => {
                    match cli.format {
                        OutputFormat::Text => println!("{}", TextReport::new(&summary)),
                        OutputFormat::Json => print_json(&summary),
                    }
                    summary.outcome.exit_code()
                }
                Err(e) => {
                    error!("Run aborted: {}", e);
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Command::InPlace(args) => match run_in_place(&args.dicom_dir, &args.database, &cancel) {
            Ok(summary) => {
                match cli.format {
                    OutputFormat::Text => println!("{}", InPlaceTextReport::new(&summary)),
                    OutputFormat::Json => print_json(&summary),
                }
                summary.outcome.exit_code()
            }
            Err(e) => {
                error!("In-place run aborted: {}", e);
                eprintln!("Error: {}", e);
                1
            }
        },
    };

    process::exit(code);
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

#[cfg(feature = "json")]
fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize to JSON: {}", e);
            eprintln!("Error: Failed to serialize to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "json"))]
fn print_json<T>(_value: &T) {
    eprintln!("Error: JSON output requires the 'json' feature");
    eprintln!("Rebuild with: cargo build --features json");
    process::exit(1);
}
