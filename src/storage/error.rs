//! Storage error types
//!
//! Defines all errors that can occur in the calendar store and its codecs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path cannot be used for the requested open mode
    #[error("Invalid path {0:?}: {1}")]
    InvalidPath(PathBuf, String),

    /// A coordinate lies outside its calendar bound
    #[error("Range error: {0}")]
    Range(String),

    /// CSV header does not match the series layout
    #[error("Header mismatch: expected [{}], found [{}]", expected.join(", "), actual.join(", "))]
    HeaderMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Series description is structurally invalid
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Operation not allowed in the store's current state
    #[error("State error: {0}")]
    State(String),

    /// Malformed CSV row
    #[error("Format error at line {line}: {message}")]
    Format { line: u64, message: String },

    /// Supplied metadata conflicts with the file header
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Data corruption detected (checksum mismatch, invalid magic, bad length)
    #[error("Corrupt data: {0}")]
    Corruption(String),
}

impl StorageError {
    /// True for errors raised by address, header or metadata validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::Range(_)
                | StorageError::HeaderMismatch { .. }
                | StorageError::InvalidMetadata(_)
        )
    }
}

impl From<csv::Error> for StorageError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => StorageError::Io(io),
            kind => StorageError::Format {
                line,
                message: format!("{:?}", kind),
            },
        }
    }
}

impl From<toml::de::Error> for StorageError {
    fn from(err: toml::de::Error) -> Self {
        StorageError::InvalidMetadata(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
