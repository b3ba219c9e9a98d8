//! Shared fixtures for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use lakeboot::keygen::SimpleKeyGenerator;
use lakeboot::orchestrator::{BootstrapOrchestrator, BootstrapOrchestratorBuilder};
use lakeboot::selector::ModeSelector;
use lakeboot::table::{TableConfig, TableMetaClient, TableType};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const HEADER: &str = "id,name,amount,region";

/// A source dataset and an empty table location inside one temp dir
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("source")).unwrap();
        Self { dir }
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    pub fn table(&self) -> PathBuf {
        self.dir.path().join("table")
    }

    /// Write `rows` (without header) as `<partition>/<name>`
    pub fn write_csv(&self, partition: &str, name: &str, rows: &[String]) -> PathBuf {
        let dir = self.source().join(partition);
        fs::create_dir_all(&dir).unwrap();
        let mut content = format!("{}\n", HEADER);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a well-formed file of `count` rows; ids are `<prefix>-<n>`
    pub fn write_rows(&self, partition: &str, name: &str, prefix: &str, count: usize) -> PathBuf {
        let rows: Vec<String> = (0..count)
            .map(|n| format!("{}-{},name{},{},{}", prefix, n, n, n * 10, partition))
            .collect();
        self.write_csv(partition, name, &rows)
    }

    /// Write a file whose second row is missing columns
    pub fn write_corrupt(&self, partition: &str, name: &str) -> PathBuf {
        self.write_csv(
            partition,
            name,
            &["ok-1,a,1,x".to_string(), "broken".to_string()],
        )
    }

    pub fn meta_client(&self) -> TableMetaClient {
        TableMetaClient::load_or_init(self.table(), TableConfig::new("test", TableType::CopyOnWrite))
            .unwrap()
    }

    /// Builder with source, selector and an `id` key generator wired
    pub fn orchestrator(&self, selector: Arc<dyn ModeSelector>) -> BootstrapOrchestratorBuilder {
        BootstrapOrchestrator::builder(self.meta_client())
            .source_base_path(self.source())
            .selector(selector)
            .key_generator(Arc::new(SimpleKeyGenerator::new("id")))
    }
}

/// Files under the table base path, excluding table metadata
pub fn table_data_files(table: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(table)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".lakeboot")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Parsed JSON lines of a table file
pub fn read_table_file(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
