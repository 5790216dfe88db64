pub mod report;

use crate::types::{
    RunConfig, DEFAULT_NAMESPACE_ROOT, DEFAULT_REPORT_NAME, DEFAULT_SANITIZED_DB_NAME,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for medanon
#[derive(Parser, Debug)]
#[command(name = "medanon")]
#[command(about = "De-identify a medical imaging archive for external release")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// No progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy and sanitize the database, relocate anonymized images, write the report
    Export(ExportArgs),

    /// Anonymize a DICOM directory and a database where they are
    InPlace(InPlaceArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Clinical outcomes database
    #[arg(value_name = "OUTCOMES_DB")]
    pub outcomes_db: PathBuf,

    /// Diagnosis-code reference database
    #[arg(value_name = "DIAGNOSIS_DB")]
    pub diagnosis_db: PathBuf,

    /// Output directory
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Folder under the output directory holding relocated images
    #[arg(long, default_value = DEFAULT_NAMESPACE_ROOT)]
    pub namespace_root: String,

    /// File name of the sanitized database copy
    #[arg(long, default_value = DEFAULT_SANITIZED_DB_NAME)]
    pub database_name: String,

    /// File name of the CSV report
    #[arg(long, default_value = DEFAULT_REPORT_NAME)]
    pub report_name: String,

    /// Parallel relocation workers
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Database lock wait in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub busy_timeout_ms: u64,

    /// Keep stored image paths in the sanitized copy as they are
    #[arg(long)]
    pub keep_paths: bool,
}

#[derive(Args, Debug)]
pub struct InPlaceArgs {
    /// Directory searched recursively for DICOM files
    #[arg(value_name = "DICOM_DIR")]
    pub dicom_dir: PathBuf,

    /// Database modified in place
    #[arg(value_name = "DATABASE")]
    pub database: PathBuf,
}

impl ExportArgs {
    /// Builds the immutable run configuration
    pub fn to_config(&self, show_progress: bool) -> RunConfig {
        let mut config = RunConfig::new(&self.outcomes_db, &self.diagnosis_db, &self.output_dir)
            .with_namespace_root(self.namespace_root.clone())
            .with_workers(self.workers)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_path_updates(!self.keep_paths)
            .with_progress(show_progress);
        config.sanitized_db_name = self.database_name.clone();
        config.report_name = self.report_name.clone();
        config
    }
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}
