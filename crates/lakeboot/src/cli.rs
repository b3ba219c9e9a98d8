//! Command-line interface
//!
//! - `lakeboot bootstrap`: initialize the table if needed and run the bootstrap
//! - `lakeboot timeline`: list the instants of a table
//! - `lakeboot index`: show the bootstrap index of a table
//!
//! Flags override the `LAKEBOOT_*` environment configuration. Command output
//! is JSON on stdout; logs go to stderr.

use crate::config::{parse_extra_metadata, BootstrapConfig};
use crate::model::BootstrapMode;
use crate::orchestrator::BootstrapOrchestrator;
use crate::pipeline::FailurePolicy;
use crate::selector::SelectorSpec;
use crate::table::{TableMetaClient, TableType};
use crate::translator::TranslatorSpec;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lakeboot_common::checksum::sha256_file;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// lakeboot - bootstrap an existing partitioned dataset into a table
#[derive(Parser, Debug)]
#[command(name = "lakeboot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Table base path
    #[arg(short, long, env = "LAKEBOOT_TABLE_PATH", global = true)]
    pub table: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the table from a source dataset
    Bootstrap(BootstrapArgs),

    /// List the instants on the table timeline
    Timeline,

    /// Show the bootstrap index
    Index {
        /// Only print the mappings of this source partition
        #[arg(short, long)]
        partition: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum SelectorKind {
    MetadataOnly,
    FullRecord,
    Regex,
}

#[derive(Args, Debug, Default)]
pub struct BootstrapArgs {
    /// Source dataset base path
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    #[arg(long)]
    pub table_name: Option<String>,

    /// copy_on_write or merge_on_read
    #[arg(long)]
    pub table_type: Option<TableType>,

    #[arg(long, value_enum)]
    pub selector: Option<SelectorKind>,

    /// Partition path pattern for the regex selector
    #[arg(long)]
    pub selector_regex: Option<String>,

    /// Mode given to partitions matching the regex
    #[arg(long)]
    pub selector_regex_mode: Option<BootstrapMode>,

    /// Comma-separated record key fields
    #[arg(short, long, value_delimiter = ',')]
    pub key_fields: Vec<String>,

    /// identity or prefix:<path>
    #[arg(long)]
    pub translator: Option<TranslatorSpec>,

    /// Comma-separated schema fields; skips schema inference
    #[arg(long, value_delimiter = ',')]
    pub schema_fields: Vec<String>,

    #[arg(short, long)]
    pub parallelism: Option<usize>,

    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// collect_and_report or fail_fast
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    #[arg(long)]
    pub file_timeout_secs: Option<u64>,

    #[arg(long)]
    pub source_extension: Option<String>,

    /// Extra commit metadata as key=value, repeatable
    #[arg(long = "extra")]
    pub extra_metadata: Vec<String>,
}

impl BootstrapArgs {
    /// Layer the flags over `config`
    pub fn apply(&self, mut config: BootstrapConfig) -> Result<BootstrapConfig> {
        if let Some(source) = &self.source {
            config.source_base_path = Some(source.clone());
        }
        if let Some(name) = &self.table_name {
            config.table_name = name.clone();
        }
        if let Some(table_type) = self.table_type {
            config.table_type = table_type;
        }
        config.selector = self.selector_spec(config.selector);
        if !self.key_fields.is_empty() {
            config.record_key_fields = self.key_fields.clone();
        }
        if let Some(translator) = &self.translator {
            config.translator = translator.clone();
        }
        if !self.schema_fields.is_empty() {
            config.schema_fields = self.schema_fields.clone();
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(secs) = self.file_timeout_secs {
            config.file_timeout_secs = Some(secs);
        }
        if let Some(ext) = &self.source_extension {
            config.source_extension = ext.clone();
        }
        for entry in &self.extra_metadata {
            config.extra_metadata.extend(parse_extra_metadata(entry)?);
        }

        config.validate()?;
        Ok(config)
    }

    fn selector_spec(&self, current: SelectorSpec) -> SelectorSpec {
        let (current_pattern, current_mode) = match &current {
            SelectorSpec::Regex {
                pattern,
                matched_mode,
            } => (pattern.clone(), *matched_mode),
            _ => (".*".to_string(), BootstrapMode::MetadataOnly),
        };
        let regex = || SelectorSpec::Regex {
            pattern: self.selector_regex.clone().unwrap_or(current_pattern.clone()),
            matched_mode: self.selector_regex_mode.unwrap_or(current_mode),
        };

        match self.selector {
            Some(SelectorKind::MetadataOnly) => SelectorSpec::MetadataOnly,
            Some(SelectorKind::FullRecord) => SelectorSpec::FullRecord,
            Some(SelectorKind::Regex) => regex(),
            None if matches!(current, SelectorSpec::Regex { .. }) => regex(),
            None => current,
        }
    }
}

/// Execute the parsed command
pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Bootstrap(args) => bootstrap(cli.table.as_deref(), args).await,
        Commands::Timeline => timeline(table_path(cli.table.as_deref())?),
        Commands::Index { partition } => {
            index(table_path(cli.table.as_deref())?, partition.as_deref())
        },
    }
}

fn table_path(table: Option<&Path>) -> Result<&Path> {
    table.context("no table given; pass --table or set LAKEBOOT_TABLE_PATH")
}

async fn bootstrap(table: Option<&Path>, args: &BootstrapArgs) -> Result<()> {
    let config = args.apply(BootstrapConfig::load(table)?)?;
    let mut orchestrator = BootstrapOrchestrator::from_config(&config)
        .with_context(|| format!("Failed to open table {}", config.table_base_path.display()))?;

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling bootstrap");
            cancel.cancel();
        }
    });

    info!(
        table = %config.table_base_path.display(),
        selector = config.selector.name(),
        policy = %config.failure_policy,
        "Starting bootstrap"
    );
    let result = orchestrator.execute().await.context("Bootstrap failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn timeline(table: &Path) -> Result<()> {
    let client = TableMetaClient::load(table)?;
    let instants = client.active_timeline()?.instants()?;
    println!("{}", serde_json::to_string_pretty(&instants)?);
    Ok(())
}

fn index(table: &Path, partition: Option<&str>) -> Result<()> {
    let client = TableMetaClient::load(table)?;
    let contents = client
        .bootstrap_index()
        .read()
        .context("Failed to read bootstrap index")?;

    let output = match partition {
        Some(partition) => {
            let mappings = contents
                .mappings_for(partition)
                .with_context(|| format!("partition '{}' is not in the index", partition))?;
            json!({ "partition_path": partition, "mappings": mappings })
        },
        None => json!({
            "header": contents.header,
            "partitions": contents
                .partitions
                .iter()
                .map(|p| json!({ "partition_path": p.partition_path, "mappings": p.mappings.len() }))
                .collect::<Vec<_>>(),
            "footer": contents.footer,
            "file_sha256": sha256_file(client.bootstrap_index().path())
                .context("Failed to fingerprint bootstrap index")?,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_config() -> BootstrapConfig {
        BootstrapConfig::builder("/tmp/table").build().unwrap()
    }

    #[test]
    fn test_parse_bootstrap_flags() {
        let cli = Cli::try_parse_from([
            "lakeboot",
            "--table",
            "/tmp/t",
            "bootstrap",
            "--source",
            "/data",
            "--key-fields",
            "id,region",
            "--failure-policy",
            "fail_fast",
            "--selector",
            "regex",
            "--selector-regex",
            "^2024",
            "--selector-regex-mode",
            "full_record",
            "--extra",
            "owner=etl",
        ])
        .unwrap();
        assert_eq!(cli.table, Some(PathBuf::from("/tmp/t")));

        let Commands::Bootstrap(args) = cli.command else {
            panic!("expected bootstrap");
        };
        let config = args.apply(base_config()).unwrap();
        assert_eq!(config.source_base_path, Some(PathBuf::from("/data")));
        assert_eq!(config.record_key_fields, vec!["id", "region"]);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(
            config.selector,
            SelectorSpec::Regex {
                pattern: "^2024".into(),
                matched_mode: BootstrapMode::FullRecord,
            }
        );
        assert_eq!(config.extra_metadata["owner"], "etl");
    }

    #[test]
    fn test_flags_absent_keep_config() {
        let config = BootstrapArgs::default().apply(base_config()).unwrap();
        assert_eq!(config, base_config());
    }

    #[test]
    fn test_invalid_flag_values_fail_validation() {
        let args = BootstrapArgs {
            parallelism: Some(0),
            ..Default::default()
        };
        assert!(args.apply(base_config()).is_err());

        assert!(Cli::try_parse_from(["lakeboot", "bootstrap", "--failure-policy", "sometimes"]).is_err());
    }

    #[test]
    fn test_parse_index_command() {
        let cli = Cli::try_parse_from(["lakeboot", "index", "-p", "2024/01", "-t", "/tmp/t"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index { partition: Some(ref p) } if p == "2024/01"
        ));
    }
}
