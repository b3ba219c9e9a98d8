//! Table file handles
//!
//! Table files are JSON lines, one record per line, named
//! `<partition>/<file_id>_<write_token>_<instant>.jsonl` under the table base
//! path. Every line carries the `_lb_*` meta fields; full records add their
//! payload columns next to them.

use crate::error::DataError;
use crate::model::{RecordPayload, TableRecord, WriteStat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const COMMIT_TIME_FIELD: &str = "_lb_commit_time";
pub const COMMIT_SEQNO_FIELD: &str = "_lb_commit_seqno";
pub const RECORD_KEY_FIELD: &str = "_lb_record_key";
pub const PARTITION_PATH_FIELD: &str = "_lb_partition_path";
pub const FILE_NAME_FIELD: &str = "_lb_file_name";

pub const TABLE_FILE_EXTENSION: &str = "jsonl";

/// Open handle to one new table file
pub trait TableFileWriter: Send {
    fn write(&mut self, record: &TableRecord) -> Result<(), DataError>;

    /// Flush, sync and report what was written
    fn close(self: Box<Self>) -> Result<WriteStat, DataError>;

    fn file_id(&self) -> &str;

    /// Absolute path of the file being written
    fn path(&self) -> &Path;
}

/// Opens table file handles for a commit
pub trait TableFileWriterFactory: Send + Sync {
    fn open(
        &self,
        instant_time: &str,
        partition_path: &str,
        file_id: &str,
    ) -> Result<Box<dyn TableFileWriter>, DataError>;
}

/// Writes JSON-lines table files under a table base path
#[derive(Debug)]
pub struct JsonLinesWriterFactory {
    base_path: PathBuf,
    next_token: AtomicU64,
}

impl JsonLinesWriterFactory {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            next_token: AtomicU64::new(0),
        }
    }
}

impl TableFileWriterFactory for JsonLinesWriterFactory {
    fn open(
        &self,
        instant_time: &str,
        partition_path: &str,
        file_id: &str,
    ) -> Result<Box<dyn TableFileWriter>, DataError> {
        let write_token = format!("0-{}", self.next_token.fetch_add(1, Ordering::Relaxed));
        let file_name = format!(
            "{}_{}_{}.{}",
            file_id, write_token, instant_time, TABLE_FILE_EXTENSION
        );
        let relative_path = if partition_path.is_empty() {
            file_name.clone()
        } else {
            format!("{}/{}", partition_path, file_name)
        };

        let path = self.base_path.join(&relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().write(true).create_new(true).open(&path)?;
        debug!(path = %path.display(), "Opened table file");

        Ok(Box::new(JsonLinesFileWriter {
            out: BufWriter::new(file),
            path,
            relative_path,
            file_name,
            file_id: file_id.to_string(),
            partition_path: partition_path.to_string(),
            instant_time: instant_time.to_string(),
            write_token,
            records: 0,
            bytes: 0,
        }))
    }
}

pub struct JsonLinesFileWriter {
    out: BufWriter<File>,
    path: PathBuf,
    relative_path: String,
    file_name: String,
    file_id: String,
    partition_path: String,
    instant_time: String,
    write_token: String,
    records: u64,
    bytes: u64,
}

impl TableFileWriter for JsonLinesFileWriter {
    fn write(&mut self, record: &TableRecord) -> Result<(), DataError> {
        if record.key.partition_path != self.partition_path {
            return Err(DataError::Schema(format!(
                "record for partition '{}' written to file of partition '{}'",
                record.key.partition_path, self.partition_path
            )));
        }

        let mut line = serde_json::Map::new();
        line.insert(COMMIT_TIME_FIELD.into(), self.instant_time.clone().into());
        line.insert(
            COMMIT_SEQNO_FIELD.into(),
            format!("{}_{}_{}", self.instant_time, self.write_token, self.records).into(),
        );
        line.insert(RECORD_KEY_FIELD.into(), record.key.record_key.clone().into());
        line.insert(PARTITION_PATH_FIELD.into(), self.partition_path.clone().into());
        line.insert(FILE_NAME_FIELD.into(), self.file_name.clone().into());
        if let RecordPayload::Full(values) = &record.payload {
            for (field, value) in values {
                line.insert(field.clone(), value.clone());
            }
        }

        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');
        self.out.write_all(&encoded)?;
        self.records += 1;
        self.bytes += encoded.len() as u64;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<WriteStat, DataError> {
        let this = *self;
        let file = this.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(WriteStat {
            file_id: this.file_id,
            partition_path: this.partition_path,
            path: this.relative_path,
            num_writes: this.records,
            num_inserts: this.records,
            total_write_bytes: this.bytes,
            total_write_errors: 0,
            prev_commit: None,
        })
    }

    fn file_id(&self) -> &str {
        &self.file_id
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
