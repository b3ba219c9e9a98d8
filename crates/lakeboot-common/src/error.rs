//! Error types shared across lakeboot crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, LakebootError>;

/// Main error type for the shared crate
#[derive(Error, Debug)]
pub enum LakebootError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
