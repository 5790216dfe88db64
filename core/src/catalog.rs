//! Read-only access to the clinical and diagnosis-reference catalogs
//!
//! Any failure to open a source or to run one of the fixed read queries is a
//! connectivity error and aborts the run. Empty result sets are valid.

use crate::error::{AnonError, Result};
use crate::types::{
    DiagnosisCode, DiagnosisTable, ImageReference, ImageReferences, OutcomeTable, RunConfig,
};
use log::{debug, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;
use std::time::Duration;

/// Outcomes: one result text per study
pub const OUTCOMES_QUERY: &str = "SELECT STUDY_UID, STUDY_RESULT FROM STUDIES";

/// Diagnosis reference values; the code is the leading token of each value
pub const DIAGNOSIS_QUERY: &str = "SELECT MKB_VALUES FROM MKB10";

/// Stored image paths joined to their study through the series table
pub const IMAGE_REFERENCES_QUERY: &str = "SELECT I.IMAGE_PATH, S.STUDY_UID \
     FROM IMAGES I \
     JOIN SERIES S ON I.SERIES_UID = S.SERIES_UID";

/// Opens a catalog source that can never be written through this connection
///
/// # Errors
///
/// Returns [`AnonError::Connectivity`] if the file cannot be opened.
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| connectivity(path, e))?;
    conn.busy_timeout(busy_timeout)
        .map_err(|e| connectivity(path, e))?;
    Ok(conn)
}

fn connectivity(path: &Path, e: rusqlite::Error) -> AnonError {
    AnonError::Connectivity(format!("{}: {}", path.display(), e))
}

fn query_error(query: &str, e: rusqlite::Error) -> AnonError {
    AnonError::Connectivity(format!("query '{}' failed: {}", query, e))
}

/// Reads a column as text whatever its storage class; NULL reads as empty
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    })
}

/// Loads study outcomes in read order
///
/// Study UIDs and result texts are trimmed. When a study UID repeats, the
/// last row read wins.
pub fn load_outcomes(conn: &Connection) -> Result<OutcomeTable> {
    let mut stmt = conn
        .prepare(OUTCOMES_QUERY)
        .map_err(|e| query_error(OUTCOMES_QUERY, e))?;
    let rows = stmt
        .query_map([], |row| Ok((text_column(row, 0)?, text_column(row, 1)?)))
        .map_err(|e| query_error(OUTCOMES_QUERY, e))?;

    let mut outcomes = OutcomeTable::new();
    for row in rows {
        let (uid, result) = row.map_err(|e| query_error(OUTCOMES_QUERY, e))?;
        let uid = uid.trim().to_string();
        if let Some(previous) = outcomes.insert(uid.clone(), result.trim()) {
            warn!(
                "Duplicate study UID {}: replacing result '{}' with the later row",
                uid, previous
            );
        }
    }

    debug!("Loaded {} study outcomes", outcomes.len());
    Ok(outcomes)
}

/// Loads the diagnosis reference table keyed by the leading token of each value
pub fn load_diagnosis_table(conn: &Connection) -> Result<DiagnosisTable> {
    let mut stmt = conn
        .prepare(DIAGNOSIS_QUERY)
        .map_err(|e| query_error(DIAGNOSIS_QUERY, e))?;
    let rows = stmt
        .query_map([], |row| text_column(row, 0))
        .map_err(|e| query_error(DIAGNOSIS_QUERY, e))?;

    let mut table = DiagnosisTable::new();
    for row in rows {
        let value = row.map_err(|e| query_error(DIAGNOSIS_QUERY, e))?;
        table.insert(DiagnosisCode::from_stored_value(&value));
    }

    debug!("Loaded {} diagnosis codes", table.len());
    Ok(table)
}

/// Loads stored image paths for studies present in `outcomes`
///
/// Rows for unknown studies are dropped. Read order and duplicates are kept.
pub fn load_image_references(
    conn: &Connection,
    outcomes: &OutcomeTable,
) -> Result<ImageReferences> {
    let mut stmt = conn
        .prepare(IMAGE_REFERENCES_QUERY)
        .map_err(|e| query_error(IMAGE_REFERENCES_QUERY, e))?;
    let rows = stmt
        .query_map([], |row| Ok((text_column(row, 0)?, text_column(row, 1)?)))
        .map_err(|e| query_error(IMAGE_REFERENCES_QUERY, e))?;

    let mut references = ImageReferences::new();
    let mut orphaned = 0usize;
    for row in rows {
        let (stored_path, uid) = row.map_err(|e| query_error(IMAGE_REFERENCES_QUERY, e))?;
        let uid = uid.trim();
        if outcomes.contains(uid) {
            references.push(ImageReference::new(uid, stored_path));
        } else {
            orphaned += 1;
        }
    }

    if orphaned > 0 {
        debug!("Ignored {} images of studies without an outcome", orphaned);
    }
    debug!("Loaded {} image references", references.len());
    Ok(references)
}

/// Column names of `table`, in declaration order
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Read-only snapshot of both catalogs for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub outcomes: OutcomeTable,
    pub diagnoses: DiagnosisTable,
    pub images: ImageReferences,
}

impl Catalog {
    /// Reads outcomes, image references and diagnosis codes
    ///
    /// # Errors
    ///
    /// Returns [`AnonError::Connectivity`] if either source is unreachable or
    /// lacks an expected table.
    pub fn load(config: &RunConfig) -> Result<Self> {
        let medical = open_read_only(&config.outcomes_db, config.busy_timeout)?;
        let outcomes = load_outcomes(&medical)?;
        let images = load_image_references(&medical, &outcomes)?;
        drop(medical);

        let reference = open_read_only(&config.diagnosis_db, config.busy_timeout)?;
        let diagnoses = load_diagnosis_table(&reference)?;

        info!(
            "Catalog snapshot: {} studies, {} image references, {} diagnosis codes",
            outcomes.len(),
            images.len(),
            diagnoses.len()
        );

        Ok(Self {
            outcomes,
            diagnoses,
            images,
        })
    }
}
