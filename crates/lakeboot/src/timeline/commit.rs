//! Commit metadata stored in completed instant files

use crate::model::WriteStat;
use lakeboot_common::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the bootstrap schema in [`CommitMetadata::extra_metadata`]
pub const SCHEMA_KEY: &str = "schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperationType {
    /// Metadata-only bootstrap: skeleton files plus the bootstrap index
    Bootstrap,
    BulkInsert,
}

impl std::fmt::Display for WriteOperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOperationType::Bootstrap => f.write_str("bootstrap"),
            WriteOperationType::BulkInsert => f.write_str("bulk_insert"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    pub operation_type: WriteOperationType,
    /// Write stats keyed by table partition path
    pub partition_to_write_stats: BTreeMap<String, Vec<WriteStat>>,
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

impl CommitMetadata {
    pub fn new(operation_type: WriteOperationType) -> Self {
        Self {
            operation_type,
            partition_to_write_stats: BTreeMap::new(),
            extra_metadata: BTreeMap::new(),
        }
    }

    pub fn add_write_stat(&mut self, stat: WriteStat) {
        self.partition_to_write_stats
            .entry(stat.partition_path.clone())
            .or_default()
            .push(stat);
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra_metadata.insert(key.into(), value.into());
    }

    /// Record the schema the commit was written with
    pub fn set_schema(&mut self, schema: &Schema) -> serde_json::Result<()> {
        self.add_metadata(SCHEMA_KEY, serde_json::to_string(schema)?);
        Ok(())
    }

    pub fn schema(&self) -> Option<Schema> {
        self.extra_metadata
            .get(SCHEMA_KEY)
            .and_then(|s| serde_json::from_str(s).ok())
    }

    pub fn write_stats(&self) -> impl Iterator<Item = &WriteStat> {
        self.partition_to_write_stats.values().flatten()
    }

    pub fn file_ids(&self) -> Vec<&str> {
        self.write_stats().map(|s| s.file_id.as_str()).collect()
    }

    pub fn total_records_written(&self) -> u64 {
        self.write_stats().map(|s| s.num_writes).sum()
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stat(file_id: &str, partition: &str, writes: u64) -> WriteStat {
        WriteStat {
            file_id: file_id.to_string(),
            partition_path: partition.to_string(),
            path: format!("{}/{}.jsonl", partition, file_id),
            num_writes: writes,
            num_inserts: writes,
            total_write_bytes: 10 * writes,
            total_write_errors: 0,
            prev_commit: None,
        }
    }

    #[test]
    fn test_stats_group_by_partition() {
        let mut metadata = CommitMetadata::new(WriteOperationType::Bootstrap);
        metadata.add_write_stat(stat("f1", "p1", 3));
        metadata.add_write_stat(stat("f2", "p1", 2));
        metadata.add_write_stat(stat("f3", "p2", 1));

        assert_eq!(metadata.partition_to_write_stats["p1"].len(), 2);
        assert_eq!(metadata.total_records_written(), 6);
        assert_eq!(metadata.file_ids(), vec!["f1", "f2", "f3"]);
    }

    #[test]
    fn test_schema_survives_serialization() {
        let schema = Schema::from_names(["id", "region"]);
        let mut metadata = CommitMetadata::new(WriteOperationType::BulkInsert);
        metadata.set_schema(&schema).unwrap();

        let restored = CommitMetadata::from_bytes(&metadata.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.schema(), Some(schema));
        assert_eq!(restored.operation_type, WriteOperationType::BulkInsert);
    }
}
