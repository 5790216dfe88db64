//! Run orchestration
//!
//! Stages run in a fixed order over one immutable [`RunConfig`]:
//! catalog snapshot, schema sanitization of the copy, image relocation, then
//! the CSV report. Connectivity and configuration errors abort the run;
//! per-item failures are counted and the run continues. The cancel token is
//! checked between stages and inside the per-row and per-image loops.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::relocate::{anonymize_directory, DirectoryReport, RelocationReport, Relocator};
use crate::report::{build_rows, write_report};
use crate::sanitize::{SanitizeOptions, SanitizeReport, SchemaSanitizer};
use crate::types::{CancelToken, RunConfig, RunOutcome};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Result of a run that was not aborted by a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub studies: usize,
    pub image_references: usize,
    pub diagnosis_codes: usize,
    pub sanitize: Option<SanitizeReport>,
    pub relocation: RelocationReport,
    pub report_path: Option<PathBuf>,
    pub report_rows: usize,
}

impl RunSummary {
    fn new(catalog: &Catalog) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            studies: catalog.outcomes.len(),
            image_references: catalog.images.len(),
            diagnosis_codes: catalog.diagnoses.len(),
            sanitize: None,
            relocation: RelocationReport::default(),
            report_path: None,
            report_rows: 0,
        }
    }

    /// Skipped images plus skipped schema steps and unrewritable paths
    pub fn skip_count(&self) -> usize {
        self.relocation.skipped()
            + self
                .sanitize
                .as_ref()
                .map(SanitizeReport::skip_count)
                .unwrap_or(0)
    }

    fn cancelled(mut self, stage: &str) -> Self {
        warn!("Run cancelled during {}", stage);
        self.outcome = RunOutcome::Cancelled;
        self
    }
}

/// Runs the whole de-identification pipeline
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a catalog source is
/// unreachable, the database copy cannot be made, or the report cannot be
/// written. Per-item failures never surface here; see
/// [`RunSummary::skip_count`].
pub fn run(config: &RunConfig, cancel: &CancelToken) -> Result<RunSummary> {
    config.validate()?;

    info!("Reading catalogs");
    let catalog = Catalog::load(config)?;
    let mut summary = RunSummary::new(&catalog);
    if cancel.is_cancelled() {
        return Ok(summary.cancelled("catalog read"));
    }

    info!("Sanitizing database copy");
    let sanitizer = SchemaSanitizer::new(SanitizeOptions {
        update_paths: config.update_paths,
        namespace_root: config.namespace_root.clone(),
        busy_timeout: config.busy_timeout,
    });
    summary.sanitize = Some(sanitizer.run(
        &config.outcomes_db,
        &config.output_dir,
        &config.sanitized_db_name,
        cancel,
    )?);
    if cancel.is_cancelled() {
        return Ok(summary.cancelled("schema sanitization"));
    }

    info!("Relocating {} images", catalog.images.len());
    let relocator = Relocator::new(
        &config.output_dir,
        config.source_base_dir(),
        &config.namespace_root,
    )
    .with_workers(config.workers)
    .with_progress(config.show_progress);
    summary.relocation = relocator.relocate_all(catalog.images.as_slice(), cancel)?;
    if cancel.is_cancelled() {
        return Ok(summary.cancelled("image relocation"));
    }

    let rows = build_rows(
        &catalog.outcomes,
        &catalog.diagnoses,
        &summary.relocation.written_by_study(),
    );
    let report_path = config.report_path();
    write_report(&rows, &report_path)?;
    summary.report_rows = rows.len();
    summary.report_path = Some(report_path);

    let skipped = summary.skip_count();
    summary.outcome = if skipped > 0 {
        warn!("Run completed with {} skipped items", skipped);
        RunOutcome::CompletedWithSkips
    } else {
        RunOutcome::Completed
    };
    info!("Run {}", summary.outcome);
    Ok(summary)
}

/// Result of an in-place run over a directory and a database
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct InPlaceSummary {
    pub outcome: RunOutcome,
    pub files: DirectoryReport,
    pub database: Option<SanitizeReport>,
}

/// Anonymizes DICOM files under `dicom_dir` and the database at `database`, both in place
///
/// Stored image paths are left untouched since the files do not move.
pub fn run_in_place(
    dicom_dir: &Path,
    database: &Path,
    cancel: &CancelToken,
) -> Result<InPlaceSummary> {
    let files = anonymize_directory(dicom_dir, cancel)?;
    if cancel.is_cancelled() {
        return Ok(InPlaceSummary {
            outcome: RunOutcome::Cancelled,
            files,
            database: None,
        });
    }

    let sanitizer = SchemaSanitizer::new(SanitizeOptions {
        update_paths: false,
        ..Default::default()
    });
    let report = sanitizer.sanitize_existing(database, cancel)?;
    info!("Anonymized medical database: {}", database.display());

    let outcome = if !files.failed.is_empty() || report.skip_count() > 0 {
        RunOutcome::CompletedWithSkips
    } else {
        RunOutcome::Completed
    };
    Ok(InPlaceSummary {
        outcome,
        files,
        database: Some(report),
    })
}
