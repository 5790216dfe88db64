use super::document::ImagingDocument;
use crate::error::Result;
use crate::types::CancelToken;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Counters of an in-place directory run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct DirectoryReport {
    pub found: usize,
    pub anonymized: usize,
    pub failed: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Recursively collects DICOM files under `directory`
///
/// Accepts `.dcm` and `.dicom` extensions (any case) and extensionless files
/// carrying the DICOM preamble. Symbolic links are never followed, so only
/// files physically inside the tree are returned. Results are sorted for a
/// stable order.
pub fn find_dicom_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_symlink() {
                debug!("Not following symbolic link {}", path.display());
            } else if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                match path.extension() {
                    Some(ext) => {
                        if ext.eq_ignore_ascii_case("dcm") || ext.eq_ignore_ascii_case("dicom") {
                            files.push(path);
                        }
                    }
                    None => {
                        if has_dicom_preamble(&path) {
                            files.push(path);
                        }
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Checks for the 128-byte preamble followed by the "DICM" magic
fn has_dicom_preamble(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut buffer = [0u8; 132];
    match file.read_exact(&mut buffer) {
        Ok(()) => &buffer[128..132] == b"DICM",
        Err(_) => false,
    }
}

/// Replaces identifying fields of every DICOM file under `directory`, in place
///
/// Each file is rewritten through a staging file, so a failure leaves the
/// original untouched. Per-file failures are logged and collected.
///
/// # Errors
///
/// Returns an error only if the directory tree cannot be listed.
pub fn anonymize_directory(directory: &Path, cancel: &CancelToken) -> Result<DirectoryReport> {
    let files = find_dicom_files(directory)?;
    let mut report = DirectoryReport {
        found: files.len(),
        ..Default::default()
    };

    if files.is_empty() {
        warn!("No DICOM files found in {}", directory.display());
        return Ok(report);
    }

    for path in files {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let outcome = ImagingDocument::open(&path).and_then(|mut document| {
            document.anonymize();
            document.save(&path)
        });
        match outcome {
            Ok(()) => report.anonymized += 1,
            Err(e) => {
                warn!("Error anonymizing {}: {}", path.display(), e);
                report.failed.push(path);
            }
        }
    }

    info!(
        "Anonymized {} of {} DICOM files in {}",
        report.anonymized,
        report.found,
        directory.display()
    );
    Ok(report)
}
