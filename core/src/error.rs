use thiserror::Error;

/// Result type for medanon operations
pub type Result<T> = std::result::Result<T, AnonError>;

/// Error types for medanon operations
#[derive(Error, Debug)]
pub enum AnonError {
    /// Catalog source unreachable, unrecognized, or missing an expected table
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Drop of an index or column that could not be applied
    #[error("Schema mutation error: {0}")]
    SchemaMutation(String),

    /// Stored path could not be classified or would escape the namespace
    #[error("Path resolution error: {0}")]
    PathResolution(String),

    /// Source image missing or unreadable
    #[error("File access error: {0}")]
    FileAccess(String),

    /// Destination could not be written
    #[error("Write error: {0}")]
    Write(String),

    /// Database error outside of connection setup
    #[error("Database error: {0}")]
    Database(String),

    /// CSV report error
    #[error("CSV error: {0}")]
    Csv(String),

    /// Run configuration rejected before any side effects
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AnonError {
    fn from(e: rusqlite::Error) -> Self {
        AnonError::Database(format!("{}", e))
    }
}

impl From<csv::Error> for AnonError {
    fn from(e: csv::Error) -> Self {
        AnonError::Csv(format!("{}", e))
    }
}
