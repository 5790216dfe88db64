//! Relocation and anonymization of referenced imaging files
//!
//! Each image reference is an independent item: its source is resolved
//! against the original database directory, its destination is the output
//! root joined with the normalized stored path, and any failure skips only
//! that item.

mod document;
mod in_place;

pub use document::{
    anonymize_file, IdentifyingField, ImagingDocument, ANONYMOUS_ID, ANONYMOUS_NAME,
    IDENTIFYING_FIELDS,
};
pub use in_place::{anonymize_directory, find_dicom_files, DirectoryReport};

#[cfg(test)]
pub(crate) use document::fixtures;

use crate::error::{AnonError, Result};
use crate::paths::{normalize, resolve_source, NormalizedPath};
use crate::types::{CancelToken, ImageReference};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;

/// What happened to one image reference
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(tag = "status", rename_all = "kebab-case"))]
pub enum ItemStatus {
    /// Anonymized copy written to the normalized destination
    Written {
        destination: NormalizedPath,
        cleared: Vec<IdentifyingField>,
    },

    /// Item failed; nothing was written for it
    Skipped { reason: String },

    /// Run was cancelled before this item started
    NotAttempted,
}

/// Outcome of one image reference
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct ItemResult {
    pub study_uid: String,
    pub stored_path: String,
    pub status: ItemStatus,
}

/// Per-item outcomes of a relocation batch, in reference order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct RelocationReport {
    pub items: Vec<ItemResult>,
}

impl RelocationReport {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped { .. }))
    }

    pub fn not_attempted(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::NotAttempted))
    }

    pub fn was_cancelled(&self) -> bool {
        self.not_attempted() > 0
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }

    /// Normalized destinations successfully written for each study, in reference order
    pub fn written_by_study(&self) -> HashMap<String, Vec<String>> {
        let mut by_study: HashMap<String, Vec<String>> = HashMap::new();
        for item in &self.items {
            if let ItemStatus::Written { destination, .. } = &item.status {
                by_study
                    .entry(item.study_uid.clone())
                    .or_default()
                    .push(destination.to_string());
            }
        }
        by_study
    }
}

/// Copies referenced images into the output tree with identifying fields replaced
#[derive(Debug, Clone)]
pub struct Relocator {
    output_dir: PathBuf,
    source_base_dir: PathBuf,
    namespace_root: String,
    workers: usize,
    show_progress: bool,
}

impl Relocator {
    /// Creates a sequential relocator without a progress bar
    pub fn new(
        output_dir: impl Into<PathBuf>,
        source_base_dir: impl Into<PathBuf>,
        namespace_root: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_base_dir: source_base_dir.into(),
            namespace_root: namespace_root.into(),
            workers: 1,
            show_progress: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Source file location of a stored path
    pub fn source_path(&self, stored_path: &str) -> Result<PathBuf> {
        resolve_source(stored_path, &self.source_base_dir)
    }

    /// Normalized destination of a stored path and its location on disk
    pub fn destination(&self, stored_path: &str) -> Result<(NormalizedPath, PathBuf)> {
        let normalized = normalize(stored_path, &self.namespace_root)?;
        let path = normalized.to_path_under(&self.output_dir);
        Ok((normalized, path))
    }

    /// Relocates a single reference
    ///
    /// # Errors
    ///
    /// Returns a per-item error ([`AnonError::PathResolution`],
    /// [`AnonError::FileAccess`] or [`AnonError::Write`]); nothing is left at
    /// the destination on error.
    pub fn relocate_one(
        &self,
        reference: &ImageReference,
    ) -> Result<(NormalizedPath, Vec<IdentifyingField>)> {
        let source = self.source_path(&reference.stored_path)?;
        let (normalized, destination) = self.destination(&reference.stored_path)?;
        let cleared = anonymize_file(&source, &destination)?;
        debug!(
            "Wrote {} ({} fields replaced)",
            destination.display(),
            cleared.len()
        );
        Ok((normalized, cleared))
    }

    fn process(&self, reference: &ImageReference, cancel: &CancelToken) -> ItemResult {
        let status = if cancel.is_cancelled() {
            ItemStatus::NotAttempted
        } else {
            match self.relocate_one(reference) {
                Ok((destination, cleared)) => ItemStatus::Written {
                    destination,
                    cleared,
                },
                Err(e) => {
                    warn!(
                        "Skipping image '{}' of study {}: {}",
                        reference.stored_path, reference.study_uid, e
                    );
                    ItemStatus::Skipped {
                        reason: e.to_string(),
                    }
                }
            }
        };

        ItemResult {
            study_uid: reference.study_uid.clone(),
            stored_path: reference.stored_path.clone(),
            status,
        }
    }

    /// Relocates every reference, never aborting on a per-item failure
    ///
    /// With more than one worker, items run on a bounded thread pool; results
    /// keep reference order either way.
    ///
    /// # Errors
    ///
    /// Returns [`AnonError::InvalidConfig`] only if the worker pool cannot be built.
    pub fn relocate_all(
        &self,
        references: &[ImageReference],
        cancel: &CancelToken,
    ) -> Result<RelocationReport> {
        warn_on_shared_destinations(self, references);

        let progress = self.progress_bar(references.len() as u64);
        let items: Vec<ItemResult> = if self.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| AnonError::InvalidConfig(format!("worker pool: {}", e)))?;
            pool.install(|| {
                references
                    .par_iter()
                    .map(|reference| {
                        let item = self.process(reference, cancel);
                        progress.inc(1);
                        item
                    })
                    .collect()
            })
        } else {
            references
                .iter()
                .map(|reference| {
                    let item = self.process(reference, cancel);
                    progress.inc(1);
                    item
                })
                .collect()
        };
        progress.finish_and_clear();

        let report = RelocationReport { items };
        info!(
            "Relocated {} of {} images ({} skipped, {} not attempted)",
            report.written(),
            report.total(),
            report.skipped(),
            report.not_attempted()
        );
        Ok(report)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style);
        }
        bar.set_message("Anonymizing images");
        bar
    }
}

/// Logs references whose different stored paths land on the same destination
fn warn_on_shared_destinations(relocator: &Relocator, references: &[ImageReference]) {
    let mut seen: HashMap<NormalizedPath, &str> = HashMap::new();
    for reference in references {
        let Ok((normalized, _)) = relocator.destination(&reference.stored_path) else {
            continue;
        };
        match seen.get(&normalized) {
            Some(first) if *first != reference.stored_path => warn!(
                "Stored paths '{}' and '{}' both map to {}; the later write wins",
                first, reference.stored_path, normalized
            ),
            Some(_) => {}
            None => {
                seen.insert(normalized, &reference.stored_path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_dicom;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Layout {
        _dir: TempDir,
        archive: PathBuf,
        out: PathBuf,
    }

    fn layout() -> Layout {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        let out = dir.path().join("out");
        fs::create_dir_all(&archive).unwrap();
        Layout {
            archive,
            out,
            _dir: dir,
        }
    }

    fn refs(items: &[(&str, &str)]) -> Vec<ImageReference> {
        items
            .iter()
            .map(|(uid, path)| ImageReference::new(*uid, *path))
            .collect()
    }

    #[test]
    fn test_relative_reference_is_relocated() {
        let l = layout();
        write_dicom(&l.archive.join("scans/img1.dcm"), Some("Doe^Jane"), Some("42"));
        let relocator = Relocator::new(&l.out, &l.archive, "images");

        let report = relocator
            .relocate_all(&refs(&[("UID1", "scans/img1.dcm")]), &CancelToken::new())
            .unwrap();

        assert_eq!(report.written(), 1);
        let written = l.out.join("images/scans/img1.dcm");
        let doc = ImagingDocument::open(&written).unwrap();
        assert_eq!(doc.get(IdentifyingField::SubjectName).as_deref(), Some(ANONYMOUS_NAME));
        assert_eq!(doc.get(IdentifyingField::SubjectId).as_deref(), Some(ANONYMOUS_ID));
        assert_eq!(
            report.written_by_study().get("UID1"),
            Some(&vec!["images/scans/img1.dcm".to_string()])
        );
    }

    #[test]
    fn test_absolute_reference_drops_volume() {
        let l = layout();
        let source = l.archive.join("vol/data/img2.dcm");
        write_dicom(&source, Some("Doe^John"), None);
        let stored = source.to_string_lossy().into_owned();
        let relocator = Relocator::new(&l.out, "/unused", "images");

        let report = relocator
            .relocate_all(&refs(&[("UID2", stored.as_str())]), &CancelToken::new())
            .unwrap();

        assert_eq!(report.written(), 1);
        let ItemStatus::Written { destination, .. } = &report.items[0].status else {
            panic!("expected a written item");
        };
        assert!(destination.as_str().starts_with("images/"));
        assert!(destination.as_str().ends_with("archive/vol/data/img2.dcm"));
        assert!(destination.to_path_under(&l.out).is_file());
    }

    #[test]
    fn test_failures_are_isolated_and_counted() {
        let l = layout();
        write_dicom(&l.archive.join("ok1.dcm"), Some("A"), Some("1"));
        write_dicom(&l.archive.join("ok2.dcm"), Some("B"), Some("2"));
        fs::write(l.archive.join("corrupt.dcm"), b"garbage").unwrap();
        let references = refs(&[
            ("UID1", "ok1.dcm"),
            ("UID3", "missing.dcm"),
            ("UID1", "corrupt.dcm"),
            ("UID1", "../outside.dcm"),
            ("UID2", "ok2.dcm"),
        ]);
        let relocator = Relocator::new(&l.out, &l.archive, "images");

        let report = relocator
            .relocate_all(&references, &CancelToken::new())
            .unwrap();

        assert_eq!(report.written(), 2);
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.written() + report.skipped(), report.total());
        assert!(!l.out.join("images/missing.dcm").exists());
        assert!(!l.out.join("images/corrupt.dcm").exists());
        assert!(!report.written_by_study().contains_key("UID3"));
        let statuses: Vec<_> = report.items.iter().map(|i| i.stored_path.as_str()).collect();
        assert_eq!(
            statuses,
            vec!["ok1.dcm", "missing.dcm", "corrupt.dcm", "../outside.dcm", "ok2.dcm"]
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let l = layout();
        let mut items = Vec::new();
        for i in 0..12 {
            let name = format!("s{}/img{}.dcm", i % 3, i);
            if i % 4 != 0 {
                write_dicom(&l.archive.join(&name), Some("X"), Some("Y"));
            }
            items.push((format!("UID{}", i % 5), name));
        }
        let references: Vec<_> = items
            .iter()
            .map(|(uid, path)| ImageReference::new(uid.as_str(), path.as_str()))
            .collect();

        let report = Relocator::new(&l.out, &l.archive, "images")
            .with_workers(4)
            .relocate_all(&references, &CancelToken::new())
            .unwrap();

        assert_eq!(report.total(), 12);
        assert_eq!(report.written(), 9);
        assert_eq!(report.skipped(), 3);
        let order: Vec<_> = report.items.iter().map(|i| i.stored_path.clone()).collect();
        let expected: Vec<_> = items.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_cancelled_batch_attempts_nothing() {
        let l = layout();
        write_dicom(&l.archive.join("a.dcm"), Some("A"), Some("1"));
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = Relocator::new(&l.out, &l.archive, "images")
            .relocate_all(&refs(&[("UID1", "a.dcm")]), &cancel)
            .unwrap();

        assert!(report.was_cancelled());
        assert_eq!(report.written(), 0);
        assert!(!l.out.exists());
    }

    #[test]
    fn test_destination_stays_within_output() {
        let l = layout();
        let relocator = Relocator::new(&l.out, &l.archive, "images");
        for stored in ["C:\\a\\b.dcm", "/x/y.dcm", "rel/z.dcm"] {
            let (_, path) = relocator.destination(stored).unwrap();
            assert!(path.starts_with(l.out.join("images")));
        }
    }
}
