//! Records, write statistics and file mappings produced by a bootstrap run

use crate::error::FileBootstrapError;
use crate::timeline::{CommitMetadata, Instant};
use lakeboot_common::SourceFileStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a source partition is brought into the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapMode {
    /// Only record keys are rewritten into skeleton files; data stays in the source files
    MetadataOnly,
    /// Every record is rewritten into table files
    FullRecord,
}

impl BootstrapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapMode::MetadataOnly => "metadata_only",
            BootstrapMode::FullRecord => "full_record",
        }
    }

    pub fn other(&self) -> BootstrapMode {
        match self {
            BootstrapMode::MetadataOnly => BootstrapMode::FullRecord,
            BootstrapMode::FullRecord => BootstrapMode::MetadataOnly,
        }
    }
}

impl std::str::FromStr for BootstrapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metadata_only" | "metadata" => Ok(BootstrapMode::MetadataOnly),
            "full_record" | "full" => Ok(BootstrapMode::FullRecord),
            other => Err(format!("unknown bootstrap mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for BootstrapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a record in the table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub record_key: String,
    pub partition_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordPayload {
    /// Skeleton record: the data lives in the mapped source file
    KeyOnly,
    Full(BTreeMap<String, serde_json::Value>),
}

/// A record headed for a table file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub key: RecordKey,
    pub payload: RecordPayload,
}

impl TableRecord {
    pub fn key_only(record_key: impl Into<String>, partition_path: impl Into<String>) -> Self {
        Self {
            key: RecordKey {
                record_key: record_key.into(),
                partition_path: partition_path.into(),
            },
            payload: RecordPayload::KeyOnly,
        }
    }

    pub fn full(
        record_key: impl Into<String>,
        partition_path: impl Into<String>,
        values: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            key: RecordKey {
                record_key: record_key.into(),
                partition_path: partition_path.into(),
            },
            payload: RecordPayload::Full(values),
        }
    }

    pub fn partition_path(&self) -> &str {
        &self.key.partition_path
    }
}

/// Statistics of one written table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStat {
    pub file_id: String,
    pub partition_path: String,
    /// Path relative to the table base path, `/`-separated
    pub path: String,
    pub num_writes: u64,
    pub num_inserts: u64,
    pub total_write_bytes: u64,
    pub total_write_errors: u64,
    pub prev_commit: Option<String>,
}

/// Links a generated skeleton file back to the source file it mirrors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapFileMapping {
    pub source_base_path: String,
    pub source_partition_path: String,
    pub target_partition_path: String,
    pub source_file_status: SourceFileStatus,
    pub generated_file_id: String,
}

/// Outcome of one committed sub-run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSummary {
    /// The completed instant
    pub instant: Instant,
    pub commit_metadata: CommitMetadata,
    pub write_stats: Vec<WriteStat>,
    /// Empty for full-record bootstrap
    pub file_mappings: Vec<BootstrapFileMapping>,
    /// Files skipped under the collect-and-report policy
    pub file_failures: Vec<FileBootstrapError>,
}

impl WriteSummary {
    pub fn records_written(&self) -> u64 {
        self.write_stats.iter().map(|s| s.num_writes).sum()
    }
}

/// Result of a bootstrap run; a side is `None` when no partition selected that mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitResult {
    pub metadata_path: Option<WriteSummary>,
    pub full_record_path: Option<WriteSummary>,
}

impl CommitResult {
    pub fn is_empty(&self) -> bool {
        self.metadata_path.is_none() && self.full_record_path.is_none()
    }

    pub fn file_failures(&self) -> impl Iterator<Item = &FileBootstrapError> {
        self.metadata_path
            .iter()
            .chain(self.full_record_path.iter())
            .flat_map(|s| s.file_failures.iter())
    }
}
