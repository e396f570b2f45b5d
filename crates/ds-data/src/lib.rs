//! Data handling for DataStudio notebooks
//!
//! Column type inference for uploaded files, the schema override store
//! and its confirmation workflow, file previews, and a SQLite-backed
//! reference executor.

pub mod config;
pub mod schema;
pub mod sources;

use thiserror::Error;

// Re-exports
pub use config::{NullConfig, StudioConfig};
pub use schema::{infer_schema, infer_type, ColumnSchema, ColumnType, SchemaDetector};
pub use schema::editor::SchemaEditor;
pub use schema::override_store::{
    JsonFileBackend, KeyValueBackend, MemoryBackend, SchemaOverrideStore, SchemaStatus,
};
pub use sources::{
    FileContent, FileFetcher, FileFormat, FilePreview, LocalFileFetcher, PreviewPayload,
    SqliteExecutor, TableRegistry,
};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Schema for '{0}' is confirmed and cannot return to unconfirmed")]
    StatusRegression(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => {
                DataError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<rusqlite::Error> for DataError {
    fn from(error: rusqlite::Error) -> Self {
        DataError::Sqlite(error.to_string())
    }
}
