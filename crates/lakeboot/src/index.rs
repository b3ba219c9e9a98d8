//! Bootstrap index: partition -> mappings from skeleton files to source files
//!
//! Stored as `<table>/.lakeboot/bootstrap/index.jsonl`, one JSON document per line:
//!
//! ```text
//! {"version":1,"source_base_path":"/data/trips","created_at":"..."}     header
//! {"partition_path":"2024/01","mappings":[...]}                         one per partition
//! {"partitions":2,"mappings":7,"checksum":"<sha256 of preceding lines>"} footer
//! ```
//!
//! The index is staged in a temporary file and renamed into place by
//! [`IndexWriter::finish`]; a writer dropped before finishing leaves nothing
//! behind. An index is written once and never updated in place.

use crate::error::IndexError;
use crate::model::BootstrapFileMapping;
use crate::timeline::sync_dir_or_warn;
use chrono::{DateTime, Utc};
use lakeboot_common::checksum::{verify_checksum, RunningChecksum};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

type Result<T> = std::result::Result<T, IndexError>;

pub const INDEX_FILE_NAME: &str = "index.jsonl";
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub version: u32,
    pub source_base_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPartition {
    pub partition_path: String,
    pub mappings: Vec<BootstrapFileMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFooter {
    pub partitions: usize,
    pub mappings: usize,
    pub checksum: String,
}

/// Fully read and verified index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexContents {
    pub header: IndexHeader,
    pub partitions: Vec<IndexPartition>,
    pub footer: IndexFooter,
}

impl IndexContents {
    pub fn partition_paths(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .map(|p| p.partition_path.as_str())
            .collect()
    }

    pub fn mappings_for(&self, partition_path: &str) -> Option<&[BootstrapFileMapping]> {
        self.partitions
            .iter()
            .find(|p| p.partition_path == partition_path)
            .map(|p| p.mappings.as_slice())
    }

    pub fn mapping_for_file_id(&self, file_id: &str) -> Option<&BootstrapFileMapping> {
        self.partitions
            .iter()
            .flat_map(|p| p.mappings.iter())
            .find(|m| m.generated_file_id == file_id)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &BootstrapFileMapping> {
        self.partitions.iter().flat_map(|p| p.mappings.iter())
    }
}

/// Handle on the index location of one table
#[derive(Debug, Clone)]
pub struct BootstrapIndex {
    dir: PathBuf,
}

impl BootstrapIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Start writing a new index; fails if one already exists
    pub fn begin_write(&self, source_base_path: &str) -> Result<IndexWriter> {
        let target = self.path();
        if target.exists() {
            return Err(IndexError::AlreadyExists(target));
        }
        std::fs::create_dir_all(&self.dir)?;
        let staged = NamedTempFile::new_in(&self.dir)?;

        let mut writer = IndexWriter {
            out: BufWriter::new(staged),
            target,
            checksum: RunningChecksum::new(),
            seen: HashSet::new(),
            partitions: 0,
            mappings: 0,
        };
        writer.write_line(&IndexHeader {
            version: INDEX_VERSION,
            source_base_path: source_base_path.to_string(),
            created_at: Utc::now(),
        })?;
        debug!(path = %writer.target.display(), "Began bootstrap index write");
        Ok(writer)
    }

    /// Read the whole index and verify its checksum
    pub fn read(&self) -> Result<IndexContents> {
        let path = self.path();
        let file = std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::NotFound(path.clone())
            } else {
                IndexError::Io(e)
            }
        })?;

        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            lines.push(line?);
        }
        let Some((footer_line, body)) = lines.split_last() else {
            return Err(IndexError::Corrupt("index file is empty".to_string()));
        };
        let Some((header_line, partition_lines)) = body.split_first() else {
            return Err(IndexError::Corrupt("index has no header".to_string()));
        };

        let footer: IndexFooter = serde_json::from_str(footer_line)
            .map_err(|e| IndexError::Corrupt(format!("unreadable footer: {}", e)))?;
        let mut checksum = RunningChecksum::new();
        for line in body {
            checksum.update(line.as_bytes());
            checksum.update(b"\n");
        }
        verify_checksum(&footer.checksum, &checksum.finish()).map_err(IndexError::Checksum)?;

        let header: IndexHeader = serde_json::from_str(header_line)?;
        if header.version != INDEX_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index version {}",
                header.version
            )));
        }
        let partitions = partition_lines
            .iter()
            .map(|line| serde_json::from_str::<IndexPartition>(line))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mapping_count: usize = partitions.iter().map(|p| p.mappings.len()).sum();
        if partitions.len() != footer.partitions || mapping_count != footer.mappings {
            return Err(IndexError::Corrupt(format!(
                "footer counts {}/{} do not match contents {}/{}",
                footer.partitions,
                footer.mappings,
                partitions.len(),
                mapping_count
            )));
        }

        Ok(IndexContents {
            header,
            partitions,
            footer,
        })
    }

    pub fn partition_paths(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .partition_paths()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn mappings_for(&self, partition_path: &str) -> Result<Vec<BootstrapFileMapping>> {
        Ok(self
            .read()?
            .mappings_for(partition_path)
            .map(<[BootstrapFileMapping]>::to_vec)
            .unwrap_or_default())
    }

    pub fn mapping_for_file_id(&self, file_id: &str) -> Result<Option<BootstrapFileMapping>> {
        Ok(self.read()?.mapping_for_file_id(file_id).cloned())
    }
}

/// Summary of a finished index write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub partitions: usize,
    pub mappings: usize,
}

/// In-progress index write; dropping it without [`IndexWriter::finish`] discards everything
pub struct IndexWriter {
    out: BufWriter<NamedTempFile>,
    target: PathBuf,
    checksum: RunningChecksum,
    seen: HashSet<String>,
    partitions: usize,
    mappings: usize,
}

impl IndexWriter {
    fn write_line<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.checksum.update(&line);
        Ok(())
    }

    #[instrument(skip(self, mappings), fields(mappings = mappings.len()))]
    pub fn append_partition(
        &mut self,
        partition_path: &str,
        mappings: &[BootstrapFileMapping],
    ) -> Result<()> {
        if !self.seen.insert(partition_path.to_string()) {
            return Err(IndexError::DuplicatePartition(partition_path.to_string()));
        }
        self.write_line(&IndexPartition {
            partition_path: partition_path.to_string(),
            mappings: mappings.to_vec(),
        })?;
        self.partitions += 1;
        self.mappings += mappings.len();
        Ok(())
    }

    /// Seal the index with its footer and make it visible
    pub fn finish(mut self) -> Result<IndexSummary> {
        let footer = IndexFooter {
            partitions: self.partitions,
            mappings: self.mappings,
            checksum: self.checksum.clone().finish(),
        };
        let mut line = serde_json::to_vec(&footer)?;
        line.push(b'\n');
        self.out.write_all(&line)?;

        let staged = self.out.into_inner().map_err(|e| e.into_error())?;
        staged.as_file().sync_all()?;
        staged.persist_noclobber(&self.target).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                IndexError::AlreadyExists(self.target.clone())
            } else {
                IndexError::Io(e.error)
            }
        })?;
        if let Some(dir) = self.target.parent() {
            sync_dir_or_warn(dir);
        }

        info!(
            path = %self.target.display(),
            partitions = self.partitions,
            mappings = self.mappings,
            "Wrote bootstrap index"
        );
        Ok(IndexSummary {
            path: self.target,
            partitions: self.partitions,
            mappings: self.mappings,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lakeboot_common::SourceFileStatus;
    use tempfile::TempDir;

    fn mapping(partition: &str, file: &str, file_id: &str) -> BootstrapFileMapping {
        BootstrapFileMapping {
            source_base_path: "/data".to_string(),
            source_partition_path: partition.to_string(),
            target_partition_path: partition.to_string(),
            source_file_status: SourceFileStatus::new(format!("/data/{}/{}", partition, file), 10, 0),
            generated_file_id: file_id.to_string(),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path().join("bootstrap"));
        assert!(!index.exists());

        let mut writer = index.begin_write("/data").unwrap();
        writer
            .append_partition("p1", &[mapping("p1", "a.csv", "f1"), mapping("p1", "b.csv", "f2")])
            .unwrap();
        writer.append_partition("p2", &[mapping("p2", "c.csv", "f3")]).unwrap();
        let summary = writer.finish().unwrap();
        assert_eq!((summary.partitions, summary.mappings), (2, 3));

        let contents = index.read().unwrap();
        assert_eq!(contents.header.source_base_path, "/data");
        assert_eq!(contents.partition_paths(), vec!["p1", "p2"]);
        let p1 = contents.mappings_for("p1").unwrap();
        assert_eq!(p1[1].generated_file_id, "f2");
        assert_eq!(
            index.mapping_for_file_id("f3").unwrap().unwrap().source_partition_path,
            "p2"
        );
        assert!(index.mappings_for("p9").unwrap().is_empty());
    }

    #[test]
    fn test_unfinished_writer_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path().join("bootstrap"));
        {
            let mut writer = index.begin_write("/data").unwrap();
            writer.append_partition("p1", &[mapping("p1", "a.csv", "f1")]).unwrap();
        }
        assert!(!index.exists());
        let leftovers = std::fs::read_dir(dir.path().join("bootstrap")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_written_once() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path());
        index.begin_write("/data").unwrap().finish().unwrap();
        assert!(matches!(
            index.begin_write("/data"),
            Err(IndexError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_duplicate_partition_rejected() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path());
        let mut writer = index.begin_write("/data").unwrap();
        writer.append_partition("p1", &[]).unwrap();
        assert!(matches!(
            writer.append_partition("p1", &[]),
            Err(IndexError::DuplicatePartition(_))
        ));
    }

    #[test]
    fn test_tampered_index_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path());
        let mut writer = index.begin_write("/data").unwrap();
        writer.append_partition("p1", &[mapping("p1", "a.csv", "f1")]).unwrap();
        writer.finish().unwrap();

        let content = std::fs::read_to_string(index.path()).unwrap();
        std::fs::write(index.path(), content.replace("a.csv", "z.csv")).unwrap();
        assert!(matches!(index.read(), Err(IndexError::Checksum(_))));
    }

    #[test]
    fn test_read_missing_index() {
        let dir = TempDir::new().unwrap();
        let index = BootstrapIndex::new(dir.path());
        assert!(matches!(index.read(), Err(IndexError::NotFound(_))));
    }
}
