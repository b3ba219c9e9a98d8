//! Error types for the bootstrap workflow

use lakeboot_common::LakebootError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Top-level error of a bootstrap run
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Partition coverage violated: {0}")]
    Coverage(CoverageReport),

    #[error("{}", describe_file_failures(.0))]
    FileBootstrap(Vec<FileBootstrapError>),

    #[error("Bootstrap index write failed: {0}")]
    IndexWrite(#[source] IndexError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Operation not supported by bootstrap: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Source data error: {0}")]
    Data(#[from] DataError),

    #[error("Bootstrap cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn describe_file_failures(failures: &[FileBootstrapError]) -> String {
    match failures.first() {
        Some(first) if failures.len() == 1 => format!("File bootstrap failed: {}", first),
        Some(first) => format!(
            "{} files failed to bootstrap; first failure: {}",
            failures.len(),
            first
        ),
        None => "File bootstrap failed".to_string(),
    }
}

/// Partition paths that break the exact-cover rule between listing and selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Listed but not assigned a mode
    pub missing: Vec<String>,
    /// Assigned a mode but never listed
    pub unexpected: Vec<String>,
    /// Assigned more than one mode (or the same mode twice)
    pub duplicated: Vec<String>,
}

impl CoverageReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.duplicated.is_empty()
    }
}

impl std::fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "missing={:?} unexpected={:?} duplicated={:?}",
            self.missing, self.unexpected, self.duplicated
        )
    }
}

/// Errors raised by the instant timeline
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Instant {0} already exists on the timeline")]
    AlreadyExists(String),

    #[error("Invalid transition for {instant}: expected state {expected}, found {actual}")]
    InvalidTransition {
        instant: String,
        expected: String,
        actual: String,
    },

    #[error("Instant {0} not found")]
    NotFound(String),

    #[error("Timeline IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Commit metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Errors raised while writing or reading the bootstrap index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Bootstrap index already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Bootstrap index not found at {0}")]
    NotFound(PathBuf),

    #[error("Partition '{0}' appended twice")]
    DuplicatePartition(String),

    #[error("Bootstrap index is corrupt: {0}")]
    Corrupt(String),

    #[error("Bootstrap index checksum failed: {0}")]
    Checksum(#[source] LakebootError),

    #[error("Index IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a collaborator: listing, schema, reading, key generation or writing
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Field '{field}' missing in {path}")]
    MissingField { field: String, path: PathBuf },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Record key error: {0}")]
    RecordKey(String),

    #[error("Listing error: {0}")]
    Listing(#[from] walkdir::Error),

    #[error(transparent)]
    Common(#[from] LakebootError),
}

/// Stage of the per-file key-projection pipeline in which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the file schema or deriving the key projection
    Schema,
    /// Opening the source read stream or the table file handle
    Open,
    /// Producer side: reading records and computing record keys
    Read,
    /// Consumer side: writing skeleton records
    Write,
    /// Closing the table file handle
    Close,
    Timeout,
    Cancelled,
    /// A worker thread panicked or was aborted
    Join,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Schema => "schema",
            PipelineStage::Open => "open",
            PipelineStage::Read => "read",
            PipelineStage::Write => "write",
            PipelineStage::Close => "close",
            PipelineStage::Timeout => "timeout",
            PipelineStage::Cancelled => "cancelled",
            PipelineStage::Join => "join",
        };
        f.write_str(name)
    }
}

/// Failure of a single source file, reported as a value rather than aborting the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBootstrapError {
    pub source_path: PathBuf,
    pub partition_path: String,
    pub stage: PipelineStage,
    pub message: String,
}

impl FileBootstrapError {
    pub fn new(
        source_path: impl Into<PathBuf>,
        partition_path: impl Into<String>,
        stage: PipelineStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            partition_path: partition_path.into(),
            stage,
            message: message.into(),
        }
    }

    /// Whether the failure is a consequence of someone else's failure or a shutdown
    pub fn is_cancellation(&self) -> bool {
        self.stage == PipelineStage::Cancelled
    }
}

impl std::fmt::Display for FileBootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (partition '{}', stage {}): {}",
            self.source_path.display(),
            self.partition_path,
            self.stage,
            self.message
        )
    }
}

impl std::error::Error for FileBootstrapError {}
