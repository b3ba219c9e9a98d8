//! Bootstrap configuration
//!
//! Loaded from `LAKEBOOT_*` environment variables (a `.env` file is honoured)
//! or assembled with [`BootstrapConfig::builder`]. Either way the result is
//! validated before use.

use crate::model::BootstrapMode;
use crate::pipeline::FailurePolicy;
use crate::selector::SelectorSpec;
use crate::table::TableType;
use crate::timeline::SCHEMA_KEY;
use crate::translator::TranslatorSpec;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TABLE_NAME: &str = "lakeboot_table";
pub const DEFAULT_PARALLELISM: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_SOURCE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub table_base_path: PathBuf,
    pub table_name: String,
    pub table_type: TableType,
    pub source_base_path: Option<PathBuf>,
    pub selector: SelectorSpec,
    /// One field gives a simple key, several a composite key
    pub record_key_fields: Vec<String>,
    pub translator: TranslatorSpec,
    /// Overrides schema inference when non-empty
    pub schema_fields: Vec<String>,
    pub parallelism: usize,
    pub queue_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub file_timeout_secs: Option<u64>,
    pub source_extension: String,
    /// Added to the metadata of every bootstrap commit
    pub extra_metadata: BTreeMap<String, String>,
}

impl BootstrapConfig {
    fn with_defaults(table_base_path: PathBuf) -> Self {
        Self {
            table_base_path,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            table_type: TableType::default(),
            source_base_path: None,
            selector: SelectorSpec::default(),
            record_key_fields: Vec::new(),
            translator: TranslatorSpec::default(),
            schema_fields: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            failure_policy: FailurePolicy::default(),
            file_timeout_secs: None,
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            extra_metadata: BTreeMap::new(),
        }
    }

    pub fn builder(table_base_path: impl Into<PathBuf>) -> BootstrapConfigBuilder {
        BootstrapConfigBuilder {
            config: Self::with_defaults(table_base_path.into()),
        }
    }

    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from the environment; `table_override` replaces
    /// `LAKEBOOT_TABLE_PATH` when given
    pub fn load(table_override: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let table_base_path = match table_override {
            Some(path) => path.to_path_buf(),
            None => env_var("LAKEBOOT_TABLE_PATH")
                .map(PathBuf::from)
                .context("LAKEBOOT_TABLE_PATH is not set")?,
        };

        let mut config = Self::with_defaults(table_base_path);
        if let Some(name) = env_var("LAKEBOOT_TABLE_NAME") {
            config.table_name = name;
        }
        config.table_type = parse_env("LAKEBOOT_TABLE_TYPE", config.table_type)?;
        config.source_base_path = env_var("LAKEBOOT_SOURCE_PATH").map(PathBuf::from);
        config.selector = selector_from_env()?;
        config.record_key_fields = env_var("LAKEBOOT_RECORD_KEY_FIELDS")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        config.translator = parse_env("LAKEBOOT_PARTITION_TRANSLATOR", TranslatorSpec::Identity)?;
        config.schema_fields = env_var("LAKEBOOT_SCHEMA_FIELDS")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        config.parallelism = parse_env("LAKEBOOT_PARALLELISM", DEFAULT_PARALLELISM)?;
        config.queue_capacity = parse_env("LAKEBOOT_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        config.failure_policy = parse_env("LAKEBOOT_FAILURE_POLICY", FailurePolicy::default())?;
        config.file_timeout_secs = env_var("LAKEBOOT_FILE_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>()
                    .with_context(|| format!("invalid LAKEBOOT_FILE_TIMEOUT_SECS '{}'", v))
            })
            .transpose()?;
        if let Some(ext) = env_var("LAKEBOOT_SOURCE_EXTENSION") {
            config.source_extension = ext;
        }
        if let Some(extra) = env_var("LAKEBOOT_EXTRA_METADATA") {
            config.extra_metadata = parse_extra_metadata(&extra)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_base_path.as_os_str().is_empty() {
            bail!("LAKEBOOT_TABLE_PATH must not be empty");
        }
        if self.parallelism == 0 {
            bail!("LAKEBOOT_PARALLELISM must be greater than 0");
        }
        if self.queue_capacity == 0 {
            bail!("LAKEBOOT_QUEUE_CAPACITY must be greater than 0");
        }
        if self.file_timeout_secs == Some(0) {
            bail!("LAKEBOOT_FILE_TIMEOUT_SECS must be greater than 0");
        }
        if let SelectorSpec::Regex { pattern, .. } = &self.selector {
            regex::Regex::new(pattern)
                .with_context(|| format!("invalid LAKEBOOT_MODE_SELECTOR_REGEX '{}'", pattern))?;
        }
        if self.extra_metadata.contains_key(SCHEMA_KEY) {
            bail!("extra metadata key '{}' is reserved", SCHEMA_KEY);
        }
        Ok(())
    }

    pub fn file_timeout(&self) -> Option<Duration> {
        self.file_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfigBuilder {
    config: BootstrapConfig,
}

impl BootstrapConfigBuilder {
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.config.table_name = name.into();
        self
    }

    pub fn table_type(mut self, table_type: TableType) -> Self {
        self.config.table_type = table_type;
        self
    }

    pub fn source_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_base_path = Some(path.into());
        self
    }

    pub fn selector(mut self, selector: SelectorSpec) -> Self {
        self.config.selector = selector;
        self
    }

    pub fn record_key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.record_key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn translator(mut self, translator: TranslatorSpec) -> Self {
        self.config.translator = translator;
        self
    }

    pub fn schema_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.schema_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn file_timeout_secs(mut self, secs: u64) -> Self {
        self.config.file_timeout_secs = Some(secs);
        self
    }

    pub fn source_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.source_extension = extension.into();
        self
    }

    pub fn extra_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<BootstrapConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn selector_from_env() -> Result<SelectorSpec> {
    let kind = env_var("LAKEBOOT_MODE_SELECTOR").unwrap_or_else(|| "metadata_only".to_string());
    match kind.to_lowercase().as_str() {
        "metadata_only" => Ok(SelectorSpec::MetadataOnly),
        "full_record" => Ok(SelectorSpec::FullRecord),
        "regex" => Ok(SelectorSpec::Regex {
            pattern: env_var("LAKEBOOT_MODE_SELECTOR_REGEX").unwrap_or_else(|| ".*".to_string()),
            matched_mode: parse_env(
                "LAKEBOOT_MODE_SELECTOR_REGEX_MODE",
                BootstrapMode::MetadataOnly,
            )?,
        }),
        other => bail!(
            "invalid LAKEBOOT_MODE_SELECTOR '{}', expected metadata_only, full_record or regex",
            other
        ),
    }
}

/// Parse `key=value,key=value`
pub fn parse_extra_metadata(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut extra = BTreeMap::new();
    for pair in split_list(raw) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid extra metadata entry '{}', expected key=value", pair))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid extra metadata entry '{}': empty key", pair);
        }
        extra.insert(key.to_string(), value.trim().to_string());
    }
    Ok(extra)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "LAKEBOOT_TABLE_PATH",
        "LAKEBOOT_TABLE_NAME",
        "LAKEBOOT_TABLE_TYPE",
        "LAKEBOOT_SOURCE_PATH",
        "LAKEBOOT_MODE_SELECTOR",
        "LAKEBOOT_MODE_SELECTOR_REGEX",
        "LAKEBOOT_MODE_SELECTOR_REGEX_MODE",
        "LAKEBOOT_RECORD_KEY_FIELDS",
        "LAKEBOOT_PARTITION_TRANSLATOR",
        "LAKEBOOT_SCHEMA_FIELDS",
        "LAKEBOOT_PARALLELISM",
        "LAKEBOOT_QUEUE_CAPACITY",
        "LAKEBOOT_FAILURE_POLICY",
        "LAKEBOOT_FILE_TIMEOUT_SECS",
        "LAKEBOOT_SOURCE_EXTENSION",
        "LAKEBOOT_EXTRA_METADATA",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_env() {
        clear_env();
        std::env::set_var("LAKEBOOT_TABLE_PATH", "/tmp/table");

        let config = BootstrapConfig::from_env().unwrap();
        assert_eq!(config.table_base_path, PathBuf::from("/tmp/table"));
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.table_type, TableType::CopyOnWrite);
        assert_eq!(config.selector, SelectorSpec::MetadataOnly);
        assert_eq!(config.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(config.failure_policy, FailurePolicy::CollectAndReport);
        assert!(config.file_timeout().is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_full_env() {
        clear_env();
        std::env::set_var("LAKEBOOT_TABLE_PATH", "/tmp/table");
        std::env::set_var("LAKEBOOT_TABLE_TYPE", "merge_on_read");
        std::env::set_var("LAKEBOOT_MODE_SELECTOR", "regex");
        std::env::set_var("LAKEBOOT_MODE_SELECTOR_REGEX", "^2024/");
        std::env::set_var("LAKEBOOT_MODE_SELECTOR_REGEX_MODE", "full_record");
        std::env::set_var("LAKEBOOT_RECORD_KEY_FIELDS", "id, region");
        std::env::set_var("LAKEBOOT_PARTITION_TRANSLATOR", "prefix:legacy");
        std::env::set_var("LAKEBOOT_FAILURE_POLICY", "fail_fast");
        std::env::set_var("LAKEBOOT_FILE_TIMEOUT_SECS", "30");
        std::env::set_var("LAKEBOOT_EXTRA_METADATA", "owner=etl,ticket=42");

        let config = BootstrapConfig::from_env().unwrap();
        assert_eq!(config.table_type, TableType::MergeOnRead);
        assert_eq!(
            config.selector,
            SelectorSpec::Regex {
                pattern: "^2024/".into(),
                matched_mode: BootstrapMode::FullRecord,
            }
        );
        assert_eq!(config.record_key_fields, vec!["id", "region"]);
        assert_eq!(config.translator, TranslatorSpec::Prefix("legacy".into()));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.file_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.extra_metadata["ticket"], "42");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_table_override_wins() {
        clear_env();
        std::env::set_var("LAKEBOOT_TABLE_PATH", "/tmp/from-env");
        let config = BootstrapConfig::load(Some(Path::new("/tmp/from-flag"))).unwrap();
        assert_eq!(config.table_base_path, PathBuf::from("/tmp/from-flag"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        clear_env();
        assert!(BootstrapConfig::from_env().is_err());

        std::env::set_var("LAKEBOOT_TABLE_PATH", "/tmp/table");
        std::env::set_var("LAKEBOOT_PARALLELISM", "0");
        assert!(BootstrapConfig::from_env().is_err());

        std::env::set_var("LAKEBOOT_PARALLELISM", "many");
        let err = BootstrapConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("LAKEBOOT_PARALLELISM"));
        clear_env();
    }

    #[test]
    fn test_builder_validates() {
        let config = BootstrapConfig::builder("/tmp/table")
            .source_base_path("/data/source")
            .record_key_fields(["id"])
            .parallelism(2)
            .build()
            .unwrap();
        assert_eq!(config.parallelism, 2);

        let err = BootstrapConfig::builder("/tmp/table")
            .selector(SelectorSpec::Regex {
                pattern: "(".into(),
                matched_mode: BootstrapMode::FullRecord,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("LAKEBOOT_MODE_SELECTOR_REGEX"));

        assert!(BootstrapConfig::builder("/tmp/table")
            .extra_metadata(SCHEMA_KEY, "x")
            .build()
            .is_err());
    }

    #[test]
    fn test_parse_extra_metadata() {
        let extra = parse_extra_metadata("a=1, b = two").unwrap();
        assert_eq!(extra["a"], "1");
        assert_eq!(extra["b"], "two");
        assert!(parse_extra_metadata("novalue").is_err());
        assert!(parse_extra_metadata("=x").is_err());
    }
}
