use super::PartitionLister;
use crate::error::DataError;
use lakeboot_common::{SourceFileStatus, SourcePartition};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Walks a local directory tree. Files and directories whose name starts with
/// `.` or `_` are skipped, as are files without the configured extension.
#[derive(Debug, Clone)]
pub struct LocalPartitionLister {
    extension: String,
}

impl LocalPartitionLister {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

impl Default for LocalPartitionLister {
    fn default() -> Self {
        Self::new("csv")
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.') || name.starts_with('_'))
            .unwrap_or(false)
}

fn partition_path_of(base_path: &Path, dir: &Path) -> String {
    dir.strip_prefix(base_path)
        .unwrap_or(dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

impl PartitionLister for LocalPartitionLister {
    fn list_leaf_partitions(&self, base_path: &Path) -> Result<Vec<SourcePartition>, DataError> {
        let mut partitions: BTreeMap<String, Vec<SourceFileStatus>> = BTreeMap::new();

        let walker = WalkDir::new(base_path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }

            let metadata = entry.metadata()?;
            let modification_time = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);

            let dir = entry.path().parent().unwrap_or(base_path);
            partitions
                .entry(partition_path_of(base_path, dir))
                .or_default()
                .push(SourceFileStatus::new(
                    entry.path(),
                    metadata.len(),
                    modification_time,
                ));
        }

        let listed: Vec<SourcePartition> = partitions
            .into_iter()
            .map(|(partition_path, mut files)| {
                files.sort_by(|a, b| a.path.cmp(&b.path));
                SourcePartition::new(partition_path, files)
            })
            .collect();

        debug!(
            base_path = %base_path.display(),
            partitions = listed.len(),
            files = listed.iter().map(|p| p.files.len()).sum::<usize>(),
            "Listed source partitions"
        );
        Ok(listed)
    }
}
