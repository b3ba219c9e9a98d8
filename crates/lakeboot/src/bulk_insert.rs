//! Commit action executors and the full-record bulk-insert path
//!
//! Bulk insert consumes its input as a stream. Each contiguous run of records
//! for one partition path is written to a fresh insert bucket, so at most one
//! table file is open at a time.

use crate::error::{BootstrapError, DataError, Result};
use crate::model::{RecordKey, TableRecord, WriteStat, WriteSummary};
use crate::source::TableRecordStream;
use crate::table::writer::{TableFileWriter, TableFileWriterFactory};
use crate::timeline::{CommitMetadata, Instant, InstantTimeline, WriteOperationType};
use lakeboot_common::Schema;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Insert/update counts of a batch of records, per partition path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadProfile {
    pub partitions: BTreeMap<String, WorkloadStat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStat {
    pub num_inserts: u64,
    pub num_updates: u64,
}

impl WorkloadProfile {
    /// Every record of a bootstrap is an insert
    pub fn record_inserts(&mut self, partition_path: &str, count: u64) {
        self.partitions
            .entry(partition_path.to_string())
            .or_default()
            .num_inserts += count;
    }

    pub fn total_inserts(&self) -> u64 {
        self.partitions.values().map(|s| s.num_inserts).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketType {
    Insert,
    Update,
}

/// A target file group that receives a share of the records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub bucket_type: BucketType,
    pub file_id_prefix: String,
    pub partition_path: String,
}

/// Routes records to buckets
pub trait Partitioner: Send + Sync {
    fn num_buckets(&self) -> usize;

    /// Latest bucket opened for the key's partition path
    fn bucket_for(&self, key: &RecordKey) -> Option<usize>;

    fn bucket_info(&self, bucket: usize) -> Option<&BucketInfo>;

    /// Open a new insert bucket for `partition_path` and route its keys there
    fn open_bucket(&mut self, partition_path: &str) -> usize;
}

/// Records handed to a single write hook
pub type InsertRecords<'a> = dyn Iterator<Item = std::result::Result<TableRecord, DataError>> + 'a;

/// The four write-path hooks of a commit action
pub trait CommitActionExecutor {
    fn upsert_partitioner(&self, profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>>;

    fn insert_partitioner(&self, profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>>;

    fn handle_insert(
        &self,
        instant_time: &str,
        bucket: &BucketInfo,
        records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>>;

    fn handle_update(
        &self,
        instant_time: &str,
        partition_path: &str,
        file_id: &str,
        records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>>;
}

/// Generic commit path that full-record bootstrap hands its records to
pub trait BulkInsertCommitter: Send + Sync {
    /// Write `records` under the requested instant and complete it
    fn bulk_insert(
        &self,
        timeline: &InstantTimeline,
        requested: &Instant,
        records: TableRecordStream,
        schema: &Schema,
        extra_metadata: &BTreeMap<String, String>,
    ) -> Result<WriteSummary>;
}

/// One insert bucket per partition path
#[derive(Debug, Clone)]
pub struct PartitionPathPartitioner {
    buckets: Vec<BucketInfo>,
    by_partition: HashMap<String, usize>,
}

impl PartitionPathPartitioner {
    pub fn new(profile: &WorkloadProfile) -> Self {
        let mut partitioner = Self {
            buckets: Vec::with_capacity(profile.partitions.len()),
            by_partition: HashMap::new(),
        };
        for partition_path in profile.partitions.keys() {
            partitioner.open_bucket(partition_path);
        }
        partitioner
    }
}

impl Partitioner for PartitionPathPartitioner {
    fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_for(&self, key: &RecordKey) -> Option<usize> {
        self.by_partition.get(&key.partition_path).copied()
    }

    fn bucket_info(&self, bucket: usize) -> Option<&BucketInfo> {
        self.buckets.get(bucket)
    }

    fn open_bucket(&mut self, partition_path: &str) -> usize {
        let bucket = self.buckets.len();
        self.buckets.push(BucketInfo {
            bucket_type: BucketType::Insert,
            file_id_prefix: Uuid::new_v4().to_string(),
            partition_path: partition_path.to_string(),
        });
        self.by_partition.insert(partition_path.to_string(), bucket);
        bucket
    }
}

fn write_all(
    writer: &mut dyn TableFileWriter,
    records: &mut InsertRecords<'_>,
) -> std::result::Result<(), DataError> {
    for record in records {
        writer.write(&record?)?;
    }
    Ok(())
}

/// Bulk insert into local JSON-lines table files
pub struct LocalBulkInsertCommitter {
    writer_factory: Arc<dyn TableFileWriterFactory>,
    base_path: PathBuf,
}

impl LocalBulkInsertCommitter {
    pub fn new(
        writer_factory: Arc<dyn TableFileWriterFactory>,
        base_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            writer_factory,
            base_path: base_path.into(),
        }
    }

    /// Write every partition run of `records` through `handle_insert`
    fn write_runs(
        &self,
        instant_time: &str,
        records: TableRecordStream,
        partitioner: &mut dyn Partitioner,
        profile: &mut WorkloadProfile,
        write_stats: &mut Vec<WriteStat>,
    ) -> Result<()> {
        let mut records = records.peekable();
        loop {
            let partition_path = match records.peek() {
                None => return Ok(()),
                Some(Ok(record)) => Some(record.key.partition_path.clone()),
                Some(Err(_)) => None,
            };
            let Some(partition_path) = partition_path else {
                if let Some(Err(e)) = records.next() {
                    return Err(e.into());
                }
                continue;
            };

            let bucket = partitioner.open_bucket(&partition_path);
            let info = partitioner.bucket_info(bucket).cloned().ok_or_else(|| {
                BootstrapError::Precondition(format!(
                    "no bucket for partition '{}'",
                    partition_path
                ))
            })?;

            let mut run = std::iter::from_fn(|| {
                let same_partition = match records.peek()? {
                    Ok(record) => record.key.partition_path == partition_path,
                    Err(_) => true,
                };
                if same_partition {
                    records.next()
                } else {
                    None
                }
            });
            let stats = self.handle_insert(instant_time, &info, &mut run)?;
            for stat in &stats {
                profile.record_inserts(&stat.partition_path, stat.num_inserts);
            }
            write_stats.extend(stats);
        }
    }

    fn discard(&self, stats: &[WriteStat]) {
        for stat in stats {
            let path = self.base_path.join(&stat.path);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove table file");
            }
        }
    }
}

impl CommitActionExecutor for LocalBulkInsertCommitter {
    fn upsert_partitioner(&self, _profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>> {
        Err(BootstrapError::UnsupportedOperation(
            "upsert partitioner is not available for bulk insert",
        ))
    }

    fn insert_partitioner(&self, profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>> {
        Ok(Box::new(PartitionPathPartitioner::new(profile)))
    }

    fn handle_insert(
        &self,
        instant_time: &str,
        bucket: &BucketInfo,
        records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>> {
        let file_id = format!("{}-0", bucket.file_id_prefix);
        let mut writer = self
            .writer_factory
            .open(instant_time, &bucket.partition_path, &file_id)?;
        let path = writer.path().to_path_buf();

        let written = write_all(writer.as_mut(), records);
        let closed = writer.close();

        match written.and(closed) {
            Ok(stat) => Ok(vec![stat]),
            Err(e) => {
                if let Err(remove) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %remove, "Failed to remove partial table file");
                }
                Err(e.into())
            },
        }
    }

    fn handle_update(
        &self,
        _instant_time: &str,
        _partition_path: &str,
        _file_id: &str,
        _records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>> {
        Err(BootstrapError::UnsupportedOperation(
            "updates are not available for bulk insert",
        ))
    }
}

impl BulkInsertCommitter for LocalBulkInsertCommitter {
    #[instrument(skip_all, fields(instant = %requested))]
    fn bulk_insert(
        &self,
        timeline: &InstantTimeline,
        requested: &Instant,
        records: TableRecordStream,
        schema: &Schema,
        extra_metadata: &BTreeMap<String, String>,
    ) -> Result<WriteSummary> {
        let inflight = timeline.transition_to_inflight(requested)?;

        // Partitions are discovered as the stream is consumed
        let mut profile = WorkloadProfile::default();
        let mut partitioner = self.insert_partitioner(&profile)?;
        let mut write_stats = Vec::new();
        if let Err(e) = self.write_runs(
            &inflight.timestamp,
            records,
            partitioner.as_mut(),
            &mut profile,
            &mut write_stats,
        ) {
            self.discard(&write_stats);
            return Err(e);
        }

        let mut metadata = CommitMetadata::new(WriteOperationType::BulkInsert);
        for (key, value) in extra_metadata {
            metadata.add_metadata(key.clone(), value.clone());
        }
        metadata.set_schema(schema)?;
        for stat in &write_stats {
            metadata.add_write_stat(stat.clone());
        }

        let completed = timeline.transition_to_completed(&inflight, &metadata.to_bytes()?)?;
        info!(
            instant = %completed,
            files = write_stats.len(),
            partitions = profile.partitions.len(),
            records = profile.total_inserts(),
            "Bulk insert committed"
        );

        Ok(WriteSummary {
            instant: completed,
            commit_metadata: metadata,
            write_stats,
            file_mappings: Vec::new(),
            file_failures: Vec::new(),
        })
    }
}
