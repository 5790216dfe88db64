//! Schema sanitization of a copy of the clinical database
//!
//! Steps run in order and each statement commits on its own:
//! 1. duplicate the original database into the output directory
//! 2. drop indices over identifying columns
//! 3. drop identifying columns
//! 4. rewrite stored image paths through [`crate::paths::normalize`]
//!
//! A crash mid-run leaves earlier drops committed. Re-running steps 2 and 3
//! only produces warnings; step 4 skips paths that are already normalized.

mod commands;

pub use commands::{
    sanitize_commands, SchemaCommand, IDENTIFYING_COLUMNS, IDENTIFYING_INDICES, SUBJECT_TABLE,
};

use crate::error::{AnonError, Result};
use crate::paths::{is_normalized, normalize};
use crate::types::{CancelToken, DEFAULT_BUSY_TIMEOUT, DEFAULT_NAMESPACE_ROOT};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stored image paths in the clinical database
pub const IMAGE_PATHS_QUERY: &str = "SELECT rowid, IMAGE_PATH FROM IMAGES";

const UPDATE_IMAGE_PATH: &str = "UPDATE IMAGES SET IMAGE_PATH = ?1 WHERE rowid = ?2";

/// Options for [`SchemaSanitizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeOptions {
    /// Rewrite stored image paths (step 4)
    pub update_paths: bool,

    /// Namespace root passed to the path normalizer
    pub namespace_root: String,

    /// Busy timeout for the connection to the copy
    pub busy_timeout: Duration,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            update_paths: true,
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// A schema command that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct SkippedCommand {
    pub command: SchemaCommand,
    pub reason: String,
}

/// A stored image path left unchanged because it could not be rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct PathFailure {
    pub stored_path: String,
    pub reason: String,
}

/// Counters of the path rewrite step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct PathRewriteStats {
    pub rewritten: usize,
    pub already_normalized: usize,
    pub failures: Vec<PathFailure>,
    pub cancelled: bool,
}

/// What a sanitizer run did to the copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct SanitizeReport {
    pub database_path: PathBuf,
    pub applied: Vec<SchemaCommand>,
    pub skipped: Vec<SkippedCommand>,
    pub paths: PathRewriteStats,
}

impl SanitizeReport {
    /// Skipped schema commands plus unrewritable paths
    pub fn skip_count(&self) -> usize {
        self.skipped.len() + self.paths.failures.len()
    }
}

/// Byte-for-byte duplicate of `original` at `output_dir/file_name`
///
/// An existing file at the destination is replaced.
pub fn copy_database(original: &Path, output_dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let destination = output_dir.join(file_name);
    fs::copy(original, &destination).map_err(|e| {
        AnonError::Write(format!(
            "copying {} to {}: {}",
            original.display(),
            destination.display(),
            e
        ))
    })?;
    debug!(
        "Copied {} to {}",
        original.display(),
        destination.display()
    );
    Ok(destination)
}

/// Applies each command in order, committing individually
///
/// A failing command (typically an index or column that is already gone) is
/// logged and recorded, and the sequence continues.
pub fn apply_schema_commands(
    conn: &Connection,
    commands: impl IntoIterator<Item = SchemaCommand>,
) -> (Vec<SchemaCommand>, Vec<SkippedCommand>) {
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for command in commands {
        match conn.execute(&command.sql(), []) {
            Ok(_) => {
                debug!("Applied {}", command);
                applied.push(command);
            }
            Err(e) => {
                let err = AnonError::SchemaMutation(format!("{}: {}", command, e));
                warn!("Skipping schema step: {}", err);
                skipped.push(SkippedCommand {
                    command,
                    reason: e.to_string(),
                });
            }
        }
    }

    (applied, skipped)
}

/// Rewrites every stored image path to its normalized form, one commit per row
///
/// Rows already in normalized form are left alone. Rows whose path cannot be
/// classified or written back are recorded and keep their stored value. The
/// cancel token is checked before each row.
pub fn rewrite_image_paths(
    conn: &Connection,
    namespace_root: &str,
    cancel: &CancelToken,
) -> Result<PathRewriteStats> {
    let mut stmt = conn.prepare(IMAGE_PATHS_QUERY)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let mut stats = PathRewriteStats::default();
    for (rowid, stored) in rows {
        if cancel.is_cancelled() {
            warn!("Path rewrite cancelled after {} rows", stats.rewritten);
            stats.cancelled = true;
            break;
        }

        let stored = stored.unwrap_or_default();
        if is_normalized(&stored, namespace_root) {
            stats.already_normalized += 1;
            continue;
        }

        let outcome = normalize(&stored, namespace_root).and_then(|normalized| {
            conn.execute(UPDATE_IMAGE_PATH, params![normalized.as_str(), rowid])
                .map_err(AnonError::from)
        });
        match outcome {
            Ok(_) => stats.rewritten += 1,
            Err(e) => {
                warn!("Keeping stored image path '{}': {}", stored, e);
                stats.failures.push(PathFailure {
                    stored_path: stored,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(stats)
}

/// Removes identifying schema objects from a copy of the clinical database
#[derive(Debug, Clone, Default)]
pub struct SchemaSanitizer {
    options: SanitizeOptions,
}

impl SchemaSanitizer {
    pub fn new(options: SanitizeOptions) -> Self {
        Self { options }
    }

    /// Copies `original` into `output_dir` and sanitizes the copy
    ///
    /// The original file is only ever read.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy cannot be made or opened, or if the image
    /// table cannot be read for the path rewrite.
    pub fn run(
        &self,
        original: &Path,
        output_dir: &Path,
        file_name: &str,
        cancel: &CancelToken,
    ) -> Result<SanitizeReport> {
        let copy = copy_database(original, output_dir, file_name)?;
        self.sanitize_existing(&copy, cancel)
    }

    /// Applies steps 2 to 4 to a database that is already a working copy
    pub fn sanitize_existing(
        &self,
        database: &Path,
        cancel: &CancelToken,
    ) -> Result<SanitizeReport> {
        let conn = Connection::open_with_flags(
            database,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AnonError::Connectivity(format!("{}: {}", database.display(), e)))?;
        conn.busy_timeout(self.options.busy_timeout)?;

        let (applied, skipped) = apply_schema_commands(&conn, sanitize_commands());
        info!(
            "Schema sanitized: {} commands applied, {} skipped",
            applied.len(),
            skipped.len()
        );

        let paths = if self.options.update_paths && !cancel.is_cancelled() {
            let stats = rewrite_image_paths(&conn, &self.options.namespace_root, cancel)?;
            info!(
                "Image paths: {} rewritten, {} already normalized, {} kept",
                stats.rewritten,
                stats.already_normalized,
                stats.failures.len()
            );
            stats
        } else {
            PathRewriteStats {
                cancelled: cancel.is_cancelled(),
                ..Default::default()
            }
        };

        Ok(SanitizeReport {
            database_path: database.to_path_buf(),
            applied,
            skipped,
            paths,
        })
    }
}
