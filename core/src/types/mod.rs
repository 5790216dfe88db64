//! Core type definitions for a de-identification run
//!
//! This module provides the data model shared across the pipeline:
//! - [`OutcomeTable`] / [`StudyRecord`]: clinical outcomes keyed by study UID
//! - [`DiagnosisTable`] / [`DiagnosisCode`]: diagnosis-code reference entries
//! - [`ImageReferences`] / [`ImageReference`]: stored image paths per study
//! - [`RunConfig`]: immutable configuration of one run
//! - [`CancelToken`]: cooperative cancellation flag
//! - [`RunOutcome`]: terminal state of a run

mod cancel;
mod config;
mod enums;
mod record;

pub use cancel::CancelToken;
pub use config::{
    RunConfig, DEFAULT_BUSY_TIMEOUT, DEFAULT_NAMESPACE_ROOT, DEFAULT_REPORT_NAME,
    DEFAULT_SANITIZED_DB_NAME,
};
pub use enums::{RunOutcome, DESCRIPTION_NOT_FOUND, IMAGES_NOT_FOUND};
pub use record::{
    leading_token, DiagnosisCode, DiagnosisTable, ImageReference, ImageReferences, OutcomeTable,
    StudyRecord,
};
