//! Error types shared across pgimport crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown job status: '{0}'")]
    UnknownStatus(String),

    #[error("Invalid error mode: '{0}' (expected abort, ignore or log)")]
    InvalidErrorMode(String),

    #[error("Invalid import scope: '{0}' (expected server, database or schema)")]
    InvalidScope(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
