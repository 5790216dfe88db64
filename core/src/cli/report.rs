use crate::pipeline::{InPlaceSummary, RunSummary};
use crate::relocate::ItemStatus;
use std::fmt;

/// Text report formatter for a pipeline run
pub struct TextReport<'a> {
    summary: &'a RunSummary,
}

impl<'a> TextReport<'a> {
    /// Creates a new text report
    pub fn new(summary: &'a RunSummary) -> Self {
        Self { summary }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "De-identification Run")?;
        writeln!(f, "=====================")?;
        writeln!(f)?;
        writeln!(f, "Outcome:          {}", s.outcome)?;
        writeln!(f, "Studies:          {}", s.studies)?;
        writeln!(f, "Diagnosis codes:  {}", s.diagnosis_codes)?;
        writeln!(f, "Image references: {}", s.image_references)?;
        writeln!(f, "Images written:   {}", s.relocation.written())?;
        writeln!(f, "Images skipped:   {}", s.relocation.skipped())?;
        if s.relocation.not_attempted() > 0 {
            writeln!(f, "Not attempted:    {}", s.relocation.not_attempted())?;
        }

        if let Some(sanitize) = &s.sanitize {
            writeln!(f)?;
            writeln!(f, "Sanitized Database")?;
            writeln!(f, "------------------")?;
            writeln!(f, "Path:             {}", sanitize.database_path.display())?;
            writeln!(f, "Schema applied:   {}", sanitize.applied.len())?;
            writeln!(f, "Schema skipped:   {}", sanitize.skipped.len())?;
            writeln!(f, "Paths rewritten:  {}", sanitize.paths.rewritten)?;
            writeln!(f, "Paths kept:       {}", sanitize.paths.failures.len())?;
        }

        match &s.report_path {
            Some(path) => {
                writeln!(f)?;
                writeln!(f, "Report:           {} ({} rows)", path.display(), s.report_rows)?;
            }
            None => {
                writeln!(f)?;
                writeln!(f, "Report:           not written")?;
            }
        }

        let skipped: Vec<_> = s
            .relocation
            .items
            .iter()
            .filter_map(|item| match &item.status {
                ItemStatus::Skipped { reason } => Some((item, reason)),
                _ => None,
            })
            .collect();
        if !skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped Images")?;
            writeln!(f, "--------------")?;
            for (item, reason) in skipped {
                writeln!(f, "{} {}: {}", item.study_uid, item.stored_path, reason)?;
            }
        }

        Ok(())
    }
}

/// Text report formatter for an in-place run
pub struct InPlaceTextReport<'a> {
    summary: &'a InPlaceSummary,
}

impl<'a> InPlaceTextReport<'a> {
    pub fn new(summary: &'a InPlaceSummary) -> Self {
        Self { summary }
    }
}

impl<'a> fmt::Display for InPlaceTextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "In-place Anonymization")?;
        writeln!(f, "======================")?;
        writeln!(f)?;
        writeln!(f, "Outcome:          {}", s.outcome)?;
        writeln!(f, "DICOM files:      {}", s.files.found)?;
        writeln!(f, "Anonymized:       {}", s.files.anonymized)?;
        for path in &s.files.failed {
            writeln!(f, "  Failed: {}", path.display())?;
        }
        match &s.database {
            Some(db) => writeln!(
                f,
                "Database:         {} ({} applied, {} skipped)",
                db.database_path.display(),
                db.applied.len(),
                db.skipped.len()
            )?,
            None => writeln!(f, "Database:         untouched")?,
        }
        Ok(())
    }
}
