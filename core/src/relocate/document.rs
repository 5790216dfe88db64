use crate::error::{AnonError, Result};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel written to the subject-name field
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Sentinel written to the subject-identifier field
pub const ANONYMOUS_ID: &str = "00000000";

/// Identifying fields of an imaging document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(rename_all = "kebab-case"))]
pub enum IdentifyingField {
    SubjectName,
    SubjectId,
}

/// Every identifying field, in the order they are cleared
pub const IDENTIFYING_FIELDS: [IdentifyingField; 2] =
    [IdentifyingField::SubjectName, IdentifyingField::SubjectId];

impl IdentifyingField {
    pub fn tag(&self) -> Tag {
        match self {
            IdentifyingField::SubjectName => tags::PATIENT_NAME,
            IdentifyingField::SubjectId => tags::PATIENT_ID,
        }
    }

    pub fn vr(&self) -> VR {
        match self {
            IdentifyingField::SubjectName => VR::PN,
            IdentifyingField::SubjectId => VR::LO,
        }
    }

    /// Replacement value written when the field is present
    pub fn sentinel(&self) -> &'static str {
        match self {
            IdentifyingField::SubjectName => ANONYMOUS_NAME,
            IdentifyingField::SubjectId => ANONYMOUS_ID,
        }
    }
}

impl fmt::Display for IdentifyingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifyingField::SubjectName => write!(f, "PatientName"),
            IdentifyingField::SubjectId => write!(f, "PatientID"),
        }
    }
}

/// Parsed imaging file with presence queries over its identifying fields
pub struct ImagingDocument {
    inner: DefaultDicomObject,
}

impl ImagingDocument {
    /// Reads and parses a document
    ///
    /// # Errors
    ///
    /// Returns [`AnonError::FileAccess`] if the file is missing or is not a
    /// readable DICOM file.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AnonError::FileAccess(format!(
                "{} not found",
                path.display()
            )));
        }
        let inner = open_file(path)
            .map_err(|e| AnonError::FileAccess(format!("{}: {}", path.display(), e)))?;
        Ok(Self { inner })
    }

    pub fn has(&self, field: IdentifyingField) -> bool {
        self.inner.element(field.tag()).is_ok()
    }

    /// Current value of a field, trimmed of padding
    pub fn get(&self, field: IdentifyingField) -> Option<String> {
        self.inner
            .element(field.tag())
            .ok()
            .and_then(|elem| elem.to_str().ok())
            .map(|s| s.trim().to_string())
    }

    pub fn set(&mut self, field: IdentifyingField, value: &str) {
        self.inner.put(DataElement::new(
            field.tag(),
            field.vr(),
            PrimitiveValue::from(value),
        ));
    }

    /// Replaces each present identifying field with its sentinel
    ///
    /// Absent fields stay absent. Returns the fields that were replaced.
    pub fn anonymize(&mut self) -> Vec<IdentifyingField> {
        let mut cleared = Vec::new();
        for field in IDENTIFYING_FIELDS {
            if self.has(field) {
                self.set(field, field.sentinel());
                cleared.push(field);
            }
        }
        cleared
    }

    /// Writes the document to `path`, creating missing parent directories
    ///
    /// The document is written to a staging file beside `path` and renamed
    /// into place, so `path` never holds a truncated document.
    ///
    /// # Errors
    ///
    /// Returns [`AnonError::Write`] if the directory, staging file or rename fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AnonError::Write(format!("creating {}: {}", parent.display(), e))
            })?;
        }

        let staging = staging_path(path);
        if let Err(e) = self.inner.write_to_file(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(AnonError::Write(format!("{}: {}", path.display(), e)));
        }
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(AnonError::Write(format!("{}: {}", path.display(), e)));
        }
        Ok(())
    }
}

/// Unique sibling path for an in-progress write
fn staging_path(path: &Path) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}-{}.partial",
        name,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Reads `source`, replaces its identifying fields and writes it to `destination`
///
/// Nothing is created at `destination` unless the source was read successfully.
pub fn anonymize_file(source: &Path, destination: &Path) -> Result<Vec<IdentifyingField>> {
    let mut document = ImagingDocument::open(source)?;
    let cleared = document.anonymize();
    document.save(destination)?;
    Ok(cleared)
}
