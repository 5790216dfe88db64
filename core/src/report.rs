//! Flat CSV report joining outcomes, diagnosis descriptions and images
//!
//! One row per study UID of the outcomes table, in read order, whether or not
//! the study has written images or a diagnosis match. Missing data is always
//! replaced by a sentinel.

use crate::error::Result;
use crate::types::{DiagnosisTable, OutcomeTable, DESCRIPTION_NOT_FOUND, IMAGES_NOT_FOUND};
use log::info;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Report header, in field order
pub const REPORT_HEADER: [&str; 4] = [
    "Image Name",
    "Study UID",
    "Study Result",
    "MKB Description",
];

/// Separator between several image paths of one study
pub const IMAGE_SEPARATOR: &str = ";";

/// One report row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub image_reference: String,
    pub study_uid: String,
    pub study_result: String,
    pub description: String,
}

impl ManifestRow {
    /// Fields in header order
    pub fn fields(&self) -> [&str; 4] {
        [
            &self.image_reference,
            &self.study_uid,
            &self.study_result,
            &self.description,
        ]
    }
}

/// Builds the report rows
///
/// `images` maps a study UID to the image paths to list for it; a study with
/// no entry (or an empty list) gets the "Not found" sentinel.
pub fn build_rows(
    outcomes: &OutcomeTable,
    diagnoses: &DiagnosisTable,
    images: &HashMap<String, Vec<String>>,
) -> Vec<ManifestRow> {
    outcomes
        .iter()
        .map(|record| {
            let description = diagnoses
                .description(record.diagnosis_code())
                .unwrap_or(DESCRIPTION_NOT_FOUND);
            let image_reference = match images.get(&record.study_uid) {
                Some(paths) if !paths.is_empty() => paths.join(IMAGE_SEPARATOR),
                _ => IMAGES_NOT_FOUND.to_string(),
            };
            ManifestRow {
                image_reference,
                study_uid: record.study_uid.clone(),
                study_result: record.result_text.clone(),
                description: description.to_string(),
            }
        })
        .collect()
}

/// Writes header and rows as CSV
pub fn write_csv<W: Write>(rows: &[ManifestRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(REPORT_HEADER)?;
    for row in rows {
        csv.write_record(row.fields())?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the report file at `path`
pub fn write_report(rows: &[ManifestRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(rows, file)?;
    info!("Wrote {} report rows to {}", rows.len(), path.display());
    Ok(())
}
