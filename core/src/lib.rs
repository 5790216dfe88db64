//! De-identification of a medical imaging archive
//!
//! Reads clinical outcomes and diagnosis codes from the source databases,
//! writes a sanitized copy of the outcomes database, relocates anonymized
//! copies of every referenced DICOM image under one namespace folder, and
//! writes a flat CSV report joining them.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod relocate;
pub mod report;
pub mod sanitize;
pub mod types;

pub use cli::report::TextReport;
pub use error::{AnonError, Result};
pub use pipeline::{run, run_in_place, InPlaceSummary, RunSummary};
pub use types::*;
