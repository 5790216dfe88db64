//! Stored image path normalization
//!
//! Stored paths come from archives written on arbitrary hosts, so
//! classification looks only at the path text: both `/` and `\` separate
//! segments, and a path is absolute when it starts with a separator or with a
//! drive designator such as `C:`. The result never depends on the platform
//! the pipeline runs on.

use crate::error::{AnonError, Result};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Whether a stored path carries a root/volume marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Absolute,
    Relative,
}

/// A stored path split into its volume and remaining segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPath<'a> {
    pub kind: PathKind,

    /// Leading volume/drive segment(s), discarded by normalization
    pub volume: Option<String>,

    /// Remaining segments, with empty and `.` segments removed
    pub segments: Vec<&'a str>,
}

/// Canonical path rooted at the namespace root, always `/`-separated
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct NormalizedPath(String);

impl NormalizedPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Native path of this entry below `base`
    pub fn to_path_under(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        path.extend(self.segments());
        path
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn drive_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^([A-Za-z]:)(.*)$").expect("Failed to compile regex"))
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Classifies a stored path by its content alone
///
/// # Errors
///
/// Returns [`AnonError::PathResolution`] if the path is empty, has no
/// segment after its volume, or contains a `..` segment.
pub fn classify(stored_path: &str) -> Result<ClassifiedPath<'_>> {
    let trimmed = stored_path.trim();
    if trimmed.is_empty() {
        return Err(AnonError::PathResolution("empty stored path".to_string()));
    }

    let (kind, volume, rest) = if let Some(caps) = drive_regex().captures(trimmed) {
        // "C:\data\x.dcm" or drive-relative "C:data\x.dcm"
        let drive = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        (PathKind::Absolute, Some(drive.to_string()), rest)
    } else if let Some(unc) = trimmed
        .strip_prefix("\\\\")
        .or_else(|| trimmed.strip_prefix("//"))
    {
        // UNC share: server and share together form the volume
        let mut parts = unc.splitn(3, is_separator);
        let server = parts.next().unwrap_or("");
        let share = parts.next().unwrap_or("");
        (
            PathKind::Absolute,
            Some(format!("{}/{}", server, share)),
            parts.next().unwrap_or(""),
        )
    } else if trimmed.starts_with(is_separator) {
        let body = trimmed.trim_start_matches(is_separator);
        let (volume, rest) = body.split_once(is_separator).unwrap_or((body, ""));
        (PathKind::Absolute, Some(volume.to_string()), rest)
    } else {
        (PathKind::Relative, None, trimmed)
    };

    let mut segments = Vec::new();
    for segment in rest.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(AnonError::PathResolution(format!(
                    "'{}' steps outside its root",
                    stored_path
                )))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(AnonError::PathResolution(format!(
            "'{}' has no file segment",
            stored_path
        )));
    }

    Ok(ClassifiedPath {
        kind,
        volume,
        segments,
    })
}

/// Maps a stored path to its canonical location under `namespace_root`
///
/// Absolute paths lose their volume segment and keep everything after it;
/// relative paths are placed under the namespace root unchanged. A relative
/// path whose first segment already is the namespace root is taken as
/// already normalized, so `normalize(normalize(p)) == normalize(p)`.
///
/// # Example
///
/// ```
/// use medanon_core::paths::normalize;
///
/// let abs = normalize("/C/data/img2.dcm", "images").unwrap();
/// assert_eq!(abs.as_str(), "images/data/img2.dcm");
///
/// let rel = normalize("scans\\img1.dcm", "images").unwrap();
/// assert_eq!(rel.as_str(), "images/scans/img1.dcm");
///
/// let again = normalize(rel.as_str(), "images").unwrap();
/// assert_eq!(again, rel);
/// ```
///
/// # Errors
///
/// Returns [`AnonError::PathResolution`] if the path cannot be classified.
pub fn normalize(stored_path: &str, namespace_root: &str) -> Result<NormalizedPath> {
    let classified = classify(stored_path)?;
    let mut segments = classified.segments.as_slice();

    if classified.kind == PathKind::Relative && segments.first() == Some(&namespace_root) {
        segments = &segments[1..];
        if segments.is_empty() {
            return Err(AnonError::PathResolution(format!(
                "'{}' names the namespace root itself",
                stored_path
            )));
        }
    }

    let mut joined = String::from(namespace_root);
    for segment in segments {
        joined.push('/');
        joined.push_str(segment);
    }
    Ok(NormalizedPath(joined))
}

/// Whether `stored_path` is already in the form [`normalize`] produces
pub fn is_normalized(stored_path: &str, namespace_root: &str) -> bool {
    normalize(stored_path, namespace_root)
        .map(|n| n.as_str() == stored_path)
        .unwrap_or(false)
}

/// Locates the source file of a stored path
///
/// Relative paths resolve against `base_dir` (the directory of the original
/// database); absolute paths are used verbatim.
///
/// # Errors
///
/// Returns [`AnonError::PathResolution`] if the path cannot be classified.
pub fn resolve_source(stored_path: &str, base_dir: &Path) -> Result<PathBuf> {
    let classified = classify(stored_path)?;
    match classified.kind {
        PathKind::Absolute => Ok(PathBuf::from(stored_path.trim())),
        PathKind::Relative => {
            let mut path = base_dir.to_path_buf();
            path.extend(classified.segments);
            Ok(path)
        }
    }
}
