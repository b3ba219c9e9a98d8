//! Table meta client: table configuration and access to table-level state

pub mod writer;

use crate::error::{BootstrapError, Result};
use crate::index::BootstrapIndex;
use crate::timeline::{ActionKind, InstantTimeline};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Directory holding all table metadata, relative to the table base path
pub const META_DIR: &str = ".lakeboot";
pub const TABLE_CONFIG_FILE: &str = "table.json";
pub const TIMELINE_DIR: &str = "timeline";
pub const BOOTSTRAP_DIR: &str = "bootstrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    #[default]
    CopyOnWrite,
    MergeOnRead,
}

impl TableType {
    /// Action recorded by commits of this table type
    pub fn commit_action(&self) -> ActionKind {
        match self {
            TableType::CopyOnWrite => ActionKind::Commit,
            TableType::MergeOnRead => ActionKind::DeltaCommit,
        }
    }
}

impl std::str::FromStr for TableType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copy_on_write" | "cow" => Ok(TableType::CopyOnWrite),
            "merge_on_read" | "mor" => Ok(TableType::MergeOnRead),
            other => Err(format!("unknown table type '{}'", other)),
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableType::CopyOnWrite => f.write_str("copy_on_write"),
            TableType::MergeOnRead => f.write_str("merge_on_read"),
        }
    }
}

/// Persisted table configuration (`.lakeboot/table.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub table_type: TableType,
    /// Source dataset the table was bootstrapped from
    #[serde(default)]
    pub bootstrap_base_path: Option<String>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            table_type,
            bootstrap_base_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableMetaClient {
    base_path: PathBuf,
    config: TableConfig,
}

impl TableMetaClient {
    /// Create the metadata directory of a new table
    pub fn init(base_path: impl Into<PathBuf>, config: TableConfig) -> Result<Self> {
        let base_path = base_path.into();
        let client = Self { base_path, config };
        if client.config_path().exists() {
            return Err(BootstrapError::Precondition(format!(
                "table already initialized at {}",
                client.base_path.display()
            )));
        }
        std::fs::create_dir_all(client.meta_path().join(TIMELINE_DIR))?;
        client.persist_config()?;
        info!(
            table = %client.config.name,
            table_type = %client.config.table_type,
            path = %client.base_path.display(),
            "Initialized table"
        );
        Ok(client)
    }

    /// Load an existing table
    pub fn load(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let config_path = base_path.join(META_DIR).join(TABLE_CONFIG_FILE);
        let bytes = std::fs::read(&config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BootstrapError::Precondition(format!(
                    "no table found at {}",
                    base_path.display()
                ))
            } else {
                BootstrapError::Io(e)
            }
        })?;
        let config = serde_json::from_slice(&bytes)?;
        Ok(Self { base_path, config })
    }

    /// Load the table, or initialize it with `config` when absent
    pub fn load_or_init(base_path: impl Into<PathBuf>, config: TableConfig) -> Result<Self> {
        let base_path = base_path.into();
        if base_path.join(META_DIR).join(TABLE_CONFIG_FILE).exists() {
            Self::load(base_path)
        } else {
            Self::init(base_path, config)
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn meta_path(&self) -> PathBuf {
        self.base_path.join(META_DIR)
    }

    fn config_path(&self) -> PathBuf {
        self.meta_path().join(TABLE_CONFIG_FILE)
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn table_type(&self) -> TableType {
        self.config.table_type
    }

    pub fn commit_action(&self) -> ActionKind {
        self.config.table_type.commit_action()
    }

    pub fn active_timeline(&self) -> Result<InstantTimeline> {
        Ok(InstantTimeline::open(self.meta_path().join(TIMELINE_DIR))?)
    }

    pub fn bootstrap_index(&self) -> BootstrapIndex {
        BootstrapIndex::new(self.meta_path().join(BOOTSTRAP_DIR))
    }

    /// Record the source dataset in the table config
    pub fn set_bootstrap_base_path(&mut self, source_base_path: impl Into<String>) -> Result<()> {
        self.config.bootstrap_base_path = Some(source_base_path.into());
        self.persist_config()
    }

    fn persist_config(&self) -> Result<()> {
        let meta = self.meta_path();
        std::fs::create_dir_all(&meta)?;
        let mut staged = NamedTempFile::new_in(&meta)?;
        serde_json::to_writer_pretty(&mut staged, &self.config)?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged
            .persist(self.config_path())
            .map_err(|e| BootstrapError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let config = TableConfig::new("trips", TableType::MergeOnRead);
        let mut client = TableMetaClient::init(dir.path(), config.clone()).unwrap();
        assert_eq!(client.commit_action(), ActionKind::DeltaCommit);

        client.set_bootstrap_base_path("/data/trips").unwrap();
        let loaded = TableMetaClient::load(dir.path()).unwrap();
        assert_eq!(loaded.config().bootstrap_base_path.as_deref(), Some("/data/trips"));
        assert_eq!(loaded.table_type(), TableType::MergeOnRead);
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = TempDir::new().unwrap();
        let config = TableConfig::new("trips", TableType::CopyOnWrite);
        TableMetaClient::init(dir.path(), config.clone()).unwrap();
        assert!(matches!(
            TableMetaClient::init(dir.path(), config.clone()),
            Err(BootstrapError::Precondition(_))
        ));
        assert!(TableMetaClient::load_or_init(dir.path(), config).is_ok());
    }

    #[test]
    fn test_load_missing_table() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TableMetaClient::load(dir.path().join("nope")),
            Err(BootstrapError::Precondition(_))
        ));
    }

    #[test]
    fn test_table_type_parse() {
        assert_eq!("cow".parse::<TableType>().unwrap(), TableType::CopyOnWrite);
        assert_eq!("merge_on_read".parse::<TableType>().unwrap(), TableType::MergeOnRead);
        assert!("hybrid".parse::<TableType>().is_err());
    }
}
