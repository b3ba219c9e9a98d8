//! Bootstrap orchestrator
//!
//! Drives one bootstrap run through its phases:
//!
//! ```text
//! Idle -> Validating -> Listing -> ModeSelection -> MetadataBootstrap -> FullBootstrap -> Done
//! ```
//!
//! Metadata-only partitions are committed at the metadata bootstrap instant
//! together with the bootstrap index; full-record partitions are handed to the
//! bulk-insert path at the full bootstrap instant. Each sub-run is skipped when
//! no partition selected its mode. Nothing is written before validation,
//! listing and mode selection have succeeded.

use crate::bulk_insert::{
    BucketInfo, BulkInsertCommitter, CommitActionExecutor, InsertRecords,
    LocalBulkInsertCommitter, Partitioner, WorkloadProfile,
};
use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, FileBootstrapError, Result};
use crate::keygen::{key_generator_for, KeyGenerator};
use crate::model::{
    BootstrapFileMapping, BootstrapMode, CommitResult, WriteStat, WriteSummary,
};
use crate::pipeline::{FailurePolicy, FileTask, KeyProjectionPipeline};
use crate::selector::{check_coverage, ModeSelector};
use crate::source::{
    CsvFullRecordProvider, CsvSourceReader, FixedSchemaProvider, FullRecordDataProvider,
    LocalPartitionLister, PartitionLister, SchemaProvider, SourceFileReader, SourceSchemaProvider,
    TableRecordStream,
};
use crate::table::writer::{JsonLinesWriterFactory, TableFileWriterFactory};
use crate::table::{TableConfig, TableMetaClient};
use crate::timeline::{
    CommitMetadata, InstantTimeline, WriteOperationType, FULL_BOOTSTRAP_INSTANT_TS,
    METADATA_BOOTSTRAP_INSTANT_TS,
};
use crate::translator::{IdentityTranslator, PartitionPathTranslator};
use lakeboot_common::{Schema, SourcePartition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Extra metadata key naming the origin of full-record input
pub const BOOTSTRAP_SOURCE_KEY: &str = "bootstrap_source";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Idle,
    Validating,
    Listing,
    ModeSelection,
    MetadataBootstrap,
    FullBootstrap,
    Done,
}

impl std::fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BootstrapPhase::Idle => "idle",
            BootstrapPhase::Validating => "validating",
            BootstrapPhase::Listing => "listing",
            BootstrapPhase::ModeSelection => "mode_selection",
            BootstrapPhase::MetadataBootstrap => "metadata_bootstrap",
            BootstrapPhase::FullBootstrap => "full_bootstrap",
            BootstrapPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Everything validation guarantees to be present
struct Validated {
    timeline: InstantTimeline,
    source_base_path: PathBuf,
    selector: Arc<dyn ModeSelector>,
    key_generator: Arc<dyn KeyGenerator>,
}

pub struct BootstrapOrchestrator {
    meta_client: TableMetaClient,
    source_base_path: Option<PathBuf>,
    selector: Option<Arc<dyn ModeSelector>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    translator: Arc<dyn PartitionPathTranslator>,
    lister: Arc<dyn PartitionLister>,
    schema_provider: Arc<dyn SchemaProvider>,
    reader: Arc<dyn SourceFileReader>,
    writer_factory: Arc<dyn TableFileWriterFactory>,
    full_record_provider: Option<Arc<dyn FullRecordDataProvider>>,
    bulk_insert: Arc<dyn BulkInsertCommitter>,
    parallelism: usize,
    queue_capacity: usize,
    failure_policy: FailurePolicy,
    file_timeout: Option<Duration>,
    extra_metadata: BTreeMap<String, String>,
    cancel: CancellationToken,
    phase: BootstrapPhase,
}

impl BootstrapOrchestrator {
    pub fn builder(meta_client: TableMetaClient) -> BootstrapOrchestratorBuilder {
        BootstrapOrchestratorBuilder::new(meta_client)
    }

    /// Open (or create) the configured table and wire the collaborators named by `config`
    pub fn from_config(config: &BootstrapConfig) -> Result<Self> {
        let meta_client = TableMetaClient::load_or_init(
            &config.table_base_path,
            TableConfig::new(config.table_name.clone(), config.table_type),
        )?;

        let reader: Arc<dyn SourceFileReader> = Arc::new(CsvSourceReader::new());
        let mut builder = Self::builder(meta_client)
            .selector(config.selector.build()?)
            .translator(config.translator.build())
            .lister(Arc::new(LocalPartitionLister::new(config.source_extension.clone())))
            .reader(reader)
            .parallelism(config.parallelism)
            .queue_capacity(config.queue_capacity)
            .failure_policy(config.failure_policy)
            .file_timeout(config.file_timeout())
            .extra_metadata(config.extra_metadata.clone());

        if let Some(source) = &config.source_base_path {
            builder = builder.source_base_path(source);
        }
        if !config.record_key_fields.is_empty() {
            builder = builder.key_generator(key_generator_for(&config.record_key_fields)?);
        }
        if !config.schema_fields.is_empty() {
            builder = builder.schema_provider(Arc::new(FixedSchemaProvider::new(
                Schema::from_names(config.schema_fields.iter()),
            )));
        }
        Ok(builder.build())
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn meta_client(&self) -> &TableMetaClient {
        &self.meta_client
    }

    /// Cancelling this token stops the run; nothing further is committed
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the bootstrap
    #[instrument(skip(self), fields(table = %self.meta_client.base_path().display()))]
    pub async fn execute(&mut self) -> Result<CommitResult> {
        self.enter(BootstrapPhase::Validating)?;
        let validated = self.validate()?;

        self.enter(BootstrapPhase::Listing)?;
        let partitions = self.list_partitions(&validated.source_base_path).await?;
        let schema = {
            let provider = self.schema_provider.clone();
            let sample = partitions.clone();
            tokio::task::spawn_blocking(move || provider.schema(&sample)).await??
        };
        info!(
            partitions = partitions.len(),
            files = partitions.iter().map(|p| p.files.len()).sum::<usize>(),
            fields = ?schema.field_names(),
            "Listed source dataset"
        );

        self.enter(BootstrapPhase::ModeSelection)?;
        let selection = validated.selector.select(&partitions);
        check_coverage(&partitions, &selection).map_err(BootstrapError::Coverage)?;
        let metadata_partitions = select_mode(&partitions, &selection, BootstrapMode::MetadataOnly);
        let full_partitions = select_mode(&partitions, &selection, BootstrapMode::FullRecord);
        info!(
            metadata_only = metadata_partitions.len(),
            full_record = full_partitions.len(),
            "Selected bootstrap modes"
        );

        let mut result = CommitResult::default();

        if !metadata_partitions.is_empty() {
            self.enter(BootstrapPhase::MetadataBootstrap)?;
            result.metadata_path = Some(
                self.metadata_bootstrap(&validated, &metadata_partitions, &schema)
                    .await?,
            );
        }

        if !full_partitions.is_empty() {
            self.enter(BootstrapPhase::FullBootstrap)?;
            result.full_record_path = Some(
                self.full_bootstrap(&validated, &full_partitions, &schema)
                    .await?,
            );
        }

        self.phase = BootstrapPhase::Done;
        info!(
            metadata_commit = result.metadata_path.is_some(),
            full_record_commit = result.full_record_path.is_some(),
            file_failures = result.file_failures().count(),
            "Bootstrap complete"
        );
        Ok(result)
    }

    fn enter(&mut self, phase: BootstrapPhase) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }
        self.phase = phase;
        info!(phase = %phase, "Entering bootstrap phase");
        Ok(())
    }

    fn validate(&self) -> Result<Validated> {
        let source_base_path = self
            .source_base_path
            .clone()
            .ok_or_else(|| BootstrapError::Precondition("source base path is not configured".into()))?;
        if !source_base_path.is_dir() {
            return Err(BootstrapError::Precondition(format!(
                "source base path {} is not a directory",
                source_base_path.display()
            )));
        }
        let selector = self
            .selector
            .clone()
            .ok_or_else(|| BootstrapError::Precondition("mode selector is not configured".into()))?;
        let key_generator = self.key_generator.clone().ok_or_else(|| {
            BootstrapError::Precondition("record key generator is not configured".into())
        })?;

        let timeline = self.meta_client.active_timeline()?;
        if let Some(last) = timeline.last_completed_commit()? {
            return Err(BootstrapError::Precondition(format!(
                "table already has a completed commit {}; bootstrap runs only on an empty table",
                last
            )));
        }

        Ok(Validated {
            timeline,
            source_base_path,
            selector,
            key_generator,
        })
    }

    async fn list_partitions(&self, source_base_path: &Path) -> Result<Vec<SourcePartition>> {
        let lister = self.lister.clone();
        let base = source_base_path.to_path_buf();
        let partitions =
            tokio::task::spawn_blocking(move || lister.list_leaf_partitions(&base)).await??;
        if partitions.is_empty() {
            return Err(BootstrapError::Precondition(format!(
                "no source data files found under {}",
                source_base_path.display()
            )));
        }
        Ok(partitions)
    }

    #[instrument(skip_all, fields(partitions = partitions.len()))]
    async fn metadata_bootstrap(
        &mut self,
        validated: &Validated,
        partitions: &[SourcePartition],
        schema: &Schema,
    ) -> Result<WriteSummary> {
        let timeline = &validated.timeline;
        let requested = timeline
            .create_requested(self.meta_client.commit_action(), METADATA_BOOTSTRAP_INSTANT_TS)?;
        let inflight = timeline.transition_to_inflight(&requested)?;

        let tasks: Vec<FileTask> = partitions
            .iter()
            .flat_map(|partition| {
                let target = self.translator.translate(&partition.partition_path);
                partition.files.iter().map(move |file| FileTask {
                    source_partition_path: partition.partition_path.clone(),
                    target_partition_path: target.clone(),
                    file: file.clone(),
                })
            })
            .collect();

        let pipeline = KeyProjectionPipeline::new(
            self.reader.clone(),
            self.writer_factory.clone(),
            validated.key_generator.clone(),
            &validated.source_base_path,
        )
        .with_queue_capacity(self.queue_capacity)
        .with_file_timeout(self.file_timeout);

        let sub_run = self.cancel.child_token();
        let outcomes = pipeline
            .run(
                &inflight.timestamp,
                tasks,
                self.parallelism,
                self.failure_policy,
                &sub_run,
            )
            .await;

        let mut produced: Vec<(WriteStat, BootstrapFileMapping)> = Vec::new();
        let mut failures: Vec<FileBootstrapError> = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(pair) => produced.push(pair),
                Err(failure) => failures.push(failure),
            }
        }

        if self.cancel.is_cancelled() {
            self.discard(produced.iter().map(|(stat, _)| stat));
            return Err(BootstrapError::Cancelled);
        }

        if !failures.is_empty()
            && (self.failure_policy == FailurePolicy::FailFast || produced.is_empty())
        {
            self.discard(produced.iter().map(|(stat, _)| stat));
            // Root cause first, the siblings it cancelled after
            failures.sort_by_key(FileBootstrapError::is_cancellation);
            return Err(BootstrapError::FileBootstrap(failures));
        }
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                succeeded = produced.len(),
                "Some source files failed to bootstrap and are excluded from the commit"
            );
        }

        let source_base = validated.source_base_path.to_string_lossy().to_string();
        self.meta_client.set_bootstrap_base_path(source_base.clone())?;

        let by_partition = group_by_table_partition(produced.iter().map(|(_, mapping)| mapping));

        let index = self.meta_client.bootstrap_index();
        let written = index.begin_write(&source_base).and_then(|mut writer| {
            for (partition_path, mappings) in &by_partition {
                writer.append_partition(partition_path, mappings)?;
            }
            writer.finish()
        });
        let summary = match written {
            Ok(summary) => summary,
            Err(e) => {
                self.discard(produced.iter().map(|(stat, _)| stat));
                return Err(BootstrapError::IndexWrite(e));
            },
        };

        let mut metadata = CommitMetadata::new(WriteOperationType::Bootstrap);
        for (key, value) in &self.extra_metadata {
            metadata.add_metadata(key.clone(), value.clone());
        }
        metadata.set_schema(schema)?;
        let (write_stats, file_mappings): (Vec<WriteStat>, Vec<BootstrapFileMapping>) =
            produced.into_iter().unzip();
        for stat in &write_stats {
            metadata.add_write_stat(stat.clone());
        }

        let completed = timeline.transition_to_completed(&inflight, &metadata.to_bytes()?)?;
        info!(
            instant = %completed,
            files = write_stats.len(),
            index_partitions = summary.partitions,
            index_mappings = summary.mappings,
            failed = failures.len(),
            "Metadata bootstrap committed"
        );

        Ok(WriteSummary {
            instant: completed,
            commit_metadata: metadata,
            write_stats,
            file_mappings,
            file_failures: failures,
        })
    }

    #[instrument(skip_all, fields(partitions = partitions.len()))]
    async fn full_bootstrap(
        &mut self,
        validated: &Validated,
        partitions: &[SourcePartition],
        schema: &Schema,
    ) -> Result<WriteSummary> {
        let provider = self.full_record_provider.clone().unwrap_or_else(|| {
            Arc::new(CsvFullRecordProvider::new(
                self.reader.clone(),
                validated.key_generator.clone(),
                self.translator.clone(),
            ))
        });
        let source_tag = provider.source_tag().to_string();

        let records: TableRecordStream = {
            let base = validated.source_base_path.clone();
            let selected = partitions.to_vec();
            tokio::task::spawn_blocking(move || provider.generate_input_records(&base, &selected))
                .await??
        };
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }

        let requested = validated
            .timeline
            .create_requested(self.meta_client.commit_action(), FULL_BOOTSTRAP_INSTANT_TS)?;

        let mut extra = self.extra_metadata.clone();
        extra.insert(BOOTSTRAP_SOURCE_KEY.to_string(), source_tag);

        let committer = self.bulk_insert.clone();
        let timeline = validated.timeline.clone();
        let schema = schema.clone();
        tokio::task::spawn_blocking(move || {
            committer.bulk_insert(&timeline, &requested, records, &schema, &extra)
        })
        .await?
    }

    fn discard<'a>(&self, stats: impl Iterator<Item = &'a WriteStat>) {
        for stat in stats {
            let path = self.meta_client.base_path().join(&stat.path);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove skeleton file");
            }
        }
    }
}

/// Mappings keyed by table partition path, ordered by first appearance.
///
/// Source partitions that translate to the same table partition share one entry.
fn group_by_table_partition<'a>(
    mappings: impl Iterator<Item = &'a BootstrapFileMapping>,
) -> Vec<(String, Vec<BootstrapFileMapping>)> {
    let mut grouped: Vec<(String, Vec<BootstrapFileMapping>)> = Vec::new();
    for mapping in mappings {
        match grouped
            .iter_mut()
            .find(|(path, _)| *path == mapping.target_partition_path)
        {
            Some((_, entries)) => entries.push(mapping.clone()),
            None => grouped.push((mapping.target_partition_path.clone(), vec![mapping.clone()])),
        }
    }
    grouped
}

/// Partitions assigned `mode`, in listing order
fn select_mode(
    partitions: &[SourcePartition],
    selection: &BTreeMap<BootstrapMode, Vec<String>>,
    mode: BootstrapMode,
) -> Vec<SourcePartition> {
    let chosen: BTreeSet<&str> = selection
        .get(&mode)
        .map(|paths| paths.iter().map(String::as_str).collect())
        .unwrap_or_default();
    partitions
        .iter()
        .filter(|p| chosen.contains(p.partition_path.as_str()))
        .cloned()
        .collect()
}

/// The generic write hooks have no meaning for a bootstrap instant
impl CommitActionExecutor for BootstrapOrchestrator {
    fn upsert_partitioner(&self, _profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>> {
        Err(BootstrapError::UnsupportedOperation(
            "upsert partitioner is not supported during bootstrap",
        ))
    }

    fn insert_partitioner(&self, _profile: &WorkloadProfile) -> Result<Box<dyn Partitioner>> {
        Err(BootstrapError::UnsupportedOperation(
            "insert partitioner is not supported during bootstrap",
        ))
    }

    fn handle_insert(
        &self,
        _instant_time: &str,
        _bucket: &BucketInfo,
        _records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>> {
        Err(BootstrapError::UnsupportedOperation(
            "inserts are not supported during bootstrap",
        ))
    }

    fn handle_update(
        &self,
        _instant_time: &str,
        _partition_path: &str,
        _file_id: &str,
        _records: &mut InsertRecords<'_>,
    ) -> Result<Vec<WriteStat>> {
        Err(BootstrapError::UnsupportedOperation(
            "updates are not supported during bootstrap",
        ))
    }
}

/// Wires an orchestrator; unset collaborators fall back to the local implementations
pub struct BootstrapOrchestratorBuilder {
    meta_client: TableMetaClient,
    source_base_path: Option<PathBuf>,
    selector: Option<Arc<dyn ModeSelector>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    translator: Option<Arc<dyn PartitionPathTranslator>>,
    lister: Option<Arc<dyn PartitionLister>>,
    schema_provider: Option<Arc<dyn SchemaProvider>>,
    reader: Option<Arc<dyn SourceFileReader>>,
    writer_factory: Option<Arc<dyn TableFileWriterFactory>>,
    full_record_provider: Option<Arc<dyn FullRecordDataProvider>>,
    bulk_insert: Option<Arc<dyn BulkInsertCommitter>>,
    parallelism: usize,
    queue_capacity: usize,
    failure_policy: FailurePolicy,
    file_timeout: Option<Duration>,
    extra_metadata: BTreeMap<String, String>,
    cancel: CancellationToken,
}

impl BootstrapOrchestratorBuilder {
    fn new(meta_client: TableMetaClient) -> Self {
        Self {
            meta_client,
            source_base_path: None,
            selector: None,
            key_generator: None,
            translator: None,
            lister: None,
            schema_provider: None,
            reader: None,
            writer_factory: None,
            full_record_provider: None,
            bulk_insert: None,
            parallelism: crate::config::DEFAULT_PARALLELISM,
            queue_capacity: crate::config::DEFAULT_QUEUE_CAPACITY,
            failure_policy: FailurePolicy::default(),
            file_timeout: None,
            extra_metadata: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn source_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_base_path = Some(path.into());
        self
    }

    pub fn selector(mut self, selector: Arc<dyn ModeSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(key_generator);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn PartitionPathTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn lister(mut self, lister: Arc<dyn PartitionLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn reader(mut self, reader: Arc<dyn SourceFileReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn writer_factory(mut self, factory: Arc<dyn TableFileWriterFactory>) -> Self {
        self.writer_factory = Some(factory);
        self
    }

    pub fn full_record_provider(mut self, provider: Arc<dyn FullRecordDataProvider>) -> Self {
        self.full_record_provider = Some(provider);
        self
    }

    pub fn bulk_insert(mut self, committer: Arc<dyn BulkInsertCommitter>) -> Self {
        self.bulk_insert = Some(committer);
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn file_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.file_timeout = timeout;
        self
    }

    pub fn extra_metadata(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra_metadata = extra;
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> BootstrapOrchestrator {
        let base_path = self.meta_client.base_path().to_path_buf();
        let reader = self
            .reader
            .unwrap_or_else(|| Arc::new(CsvSourceReader::new()));
        let schema_provider = self
            .schema_provider
            .unwrap_or_else(|| Arc::new(SourceSchemaProvider::new(reader.clone())));
        let writer_factory = self
            .writer_factory
            .unwrap_or_else(|| Arc::new(JsonLinesWriterFactory::new(base_path.clone())));
        let bulk_insert = self.bulk_insert.unwrap_or_else(|| {
            Arc::new(LocalBulkInsertCommitter::new(
                writer_factory.clone(),
                base_path,
            ))
        });

        BootstrapOrchestrator {
            meta_client: self.meta_client,
            source_base_path: self.source_base_path,
            selector: self.selector,
            key_generator: self.key_generator,
            translator: self
                .translator
                .unwrap_or_else(|| Arc::new(IdentityTranslator)),
            lister: self
                .lister
                .unwrap_or_else(|| Arc::new(LocalPartitionLister::default())),
            schema_provider,
            reader,
            writer_factory,
            full_record_provider: self.full_record_provider,
            bulk_insert,
            parallelism: self.parallelism,
            queue_capacity: self.queue_capacity,
            failure_policy: self.failure_policy,
            file_timeout: self.file_timeout,
            extra_metadata: self.extra_metadata,
            cancel: self.cancel,
            phase: BootstrapPhase::Idle,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::keygen::SimpleKeyGenerator;
    use crate::selector::{FullRecordSelector, MetadataOnlySelector, SelectorSpec};
    use crate::table::TableType;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        table: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let table = dir.path().join("table");
        fs::create_dir_all(source.join("p1")).unwrap();
        fs::write(source.join("p1/a.csv"), "id,name\n1,ann\n2,bob\n").unwrap();
        Fixture {
            _dir: dir,
            source,
            table,
        }
    }

    fn client(fx: &Fixture) -> TableMetaClient {
        TableMetaClient::load_or_init(&fx.table, TableConfig::new("t", TableType::CopyOnWrite))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_source_path_fails_validation() {
        let fx = fixture();
        let mut orchestrator = BootstrapOrchestrator::builder(client(&fx))
            .selector(Arc::new(MetadataOnlySelector))
            .key_generator(Arc::new(SimpleKeyGenerator::new("id")))
            .build();

        let err = orchestrator.execute().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Precondition(_)));
        assert_eq!(orchestrator.phase(), BootstrapPhase::Validating);
        let timeline = orchestrator.meta_client().active_timeline().unwrap();
        assert!(timeline.instants().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_generator_fails_validation() {
        let fx = fixture();
        let mut orchestrator = BootstrapOrchestrator::builder(client(&fx))
            .source_base_path(&fx.source)
            .selector(Arc::new(MetadataOnlySelector))
            .build();

        let err = orchestrator.execute().await.unwrap_err();
        assert!(err.to_string().contains("key generator"));
    }

    #[tokio::test]
    async fn test_metadata_run_reaches_done_with_extra_metadata() {
        let fx = fixture();
        let mut extra = BTreeMap::new();
        extra.insert("owner".to_string(), "etl".to_string());
        let mut orchestrator = BootstrapOrchestrator::builder(client(&fx))
            .source_base_path(&fx.source)
            .selector(Arc::new(MetadataOnlySelector))
            .key_generator(Arc::new(SimpleKeyGenerator::new("id")))
            .extra_metadata(extra)
            .build();

        let result = orchestrator.execute().await.unwrap();
        assert_eq!(orchestrator.phase(), BootstrapPhase::Done);
        assert!(result.full_record_path.is_none());

        let summary = result.metadata_path.unwrap();
        assert_eq!(summary.instant.timestamp, METADATA_BOOTSTRAP_INSTANT_TS);
        assert_eq!(summary.commit_metadata.extra_metadata["owner"], "etl");
        assert_eq!(
            summary.commit_metadata.schema().unwrap().field_names(),
            vec!["id", "name"]
        );
        assert_eq!(
            orchestrator.meta_client().config().bootstrap_base_path.as_deref(),
            Some(fx.source.to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn test_full_record_run_tags_source() {
        let fx = fixture();
        let mut orchestrator = BootstrapOrchestrator::builder(client(&fx))
            .source_base_path(&fx.source)
            .selector(Arc::new(FullRecordSelector))
            .key_generator(Arc::new(SimpleKeyGenerator::new("id")))
            .build();

        let result = orchestrator.execute().await.unwrap();
        assert!(result.metadata_path.is_none());
        let summary = result.full_record_path.unwrap();
        assert_eq!(summary.instant.timestamp, FULL_BOOTSTRAP_INSTANT_TS);
        assert_eq!(
            summary.commit_metadata.extra_metadata[BOOTSTRAP_SOURCE_KEY],
            "bootstrap_source"
        );
        assert_eq!(summary.records_written(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_any_write() {
        let fx = fixture();
        let mut orchestrator = BootstrapOrchestrator::builder(client(&fx))
            .source_base_path(&fx.source)
            .selector(Arc::new(MetadataOnlySelector))
            .key_generator(Arc::new(SimpleKeyGenerator::new("id")))
            .build();
        orchestrator.cancellation_token().cancel();

        assert!(matches!(
            orchestrator.execute().await,
            Err(BootstrapError::Cancelled)
        ));
        assert_eq!(orchestrator.phase(), BootstrapPhase::Idle);
    }

    #[test]
    fn test_from_config_wires_collaborators() {
        let fx = fixture();
        let config = BootstrapConfig::builder(&fx.table)
            .source_base_path(&fx.source)
            .selector(SelectorSpec::FullRecord)
            .record_key_fields(["id", "name"])
            .table_type(TableType::MergeOnRead)
            .build()
            .unwrap();

        let orchestrator = BootstrapOrchestrator::from_config(&config).unwrap();
        assert_eq!(orchestrator.meta_client().table_type(), TableType::MergeOnRead);
        assert!(orchestrator.key_generator.is_some());
        assert_eq!(orchestrator.phase(), BootstrapPhase::Idle);
    }

    fn no_records() -> std::iter::Empty<std::result::Result<crate::model::TableRecord, DataError>> {
        std::iter::empty()
    }

    #[test]
    fn test_write_hooks_are_unsupported() {
        let fx = fixture();
        let orchestrator = BootstrapOrchestrator::builder(client(&fx)).build();
        let bucket = BucketInfo {
            bucket_type: crate::bulk_insert::BucketType::Insert,
            file_id_prefix: "f".into(),
            partition_path: "p1".into(),
        };
        let profile = WorkloadProfile::default();

        assert!(matches!(
            orchestrator.upsert_partitioner(&profile),
            Err(BootstrapError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            orchestrator.insert_partitioner(&profile),
            Err(BootstrapError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            orchestrator.handle_insert("1", &bucket, &mut no_records()),
            Err(BootstrapError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            orchestrator.handle_update("1", "p1", "f", &mut no_records()),
            Err(BootstrapError::UnsupportedOperation(_))
        ));
    }
}
