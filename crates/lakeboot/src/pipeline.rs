//! Key-projection pipeline for metadata-only bootstrap
//!
//! Each source file is streamed through two stages running on the blocking
//! pool and connected by a bounded channel:
//!
//! ```text
//! source file --(key columns only)--> producer --mpsc(queue_capacity)--> consumer --> skeleton file
//! ```
//!
//! The producer blocks when the queue is full and the consumer blocks when it
//! is empty. A failure on either side cancels the file's token so that both
//! stages unwind; the table file handle is closed on every path and the
//! partial file of a failed pipeline is removed. Files fan out with
//! `buffer_unordered`, each pipeline independent of the others.

use crate::error::{FileBootstrapError, PipelineStage};
use crate::keygen::KeyGenerator;
use crate::model::{BootstrapFileMapping, TableRecord, WriteStat};
use crate::source::{RecordStream, SourceFileReader};
use crate::table::writer::TableFileWriterFactory;
use futures::stream::{self, StreamExt};
use lakeboot_common::SourceFileStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the run does when a single file fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep going; failed files are reported next to the successful ones
    #[default]
    CollectAndReport,
    /// The first failure cancels all sibling files and aborts the sub-run
    FailFast,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "collect_and_report" | "collect" => Ok(FailurePolicy::CollectAndReport),
            "fail_fast" => Ok(FailurePolicy::FailFast),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::CollectAndReport => f.write_str("collect_and_report"),
            FailurePolicy::FailFast => f.write_str("fail_fast"),
        }
    }
}

/// One source file to bootstrap
#[derive(Debug, Clone)]
pub struct FileTask {
    pub source_partition_path: String,
    pub target_partition_path: String,
    pub file: SourceFileStatus,
}

pub type FileOutcome = Result<(WriteStat, BootstrapFileMapping), FileBootstrapError>;

type StageResult<T> = Result<T, (PipelineStage, String)>;

#[derive(Clone)]
pub struct KeyProjectionPipeline {
    reader: Arc<dyn SourceFileReader>,
    writer_factory: Arc<dyn TableFileWriterFactory>,
    key_generator: Arc<dyn KeyGenerator>,
    source_base_path: String,
    queue_capacity: usize,
    file_timeout: Option<Duration>,
}

impl KeyProjectionPipeline {
    pub fn new(
        reader: Arc<dyn SourceFileReader>,
        writer_factory: Arc<dyn TableFileWriterFactory>,
        key_generator: Arc<dyn KeyGenerator>,
        source_base_path: &Path,
    ) -> Self {
        Self {
            reader,
            writer_factory,
            key_generator,
            source_base_path: source_base_path.to_string_lossy().to_string(),
            queue_capacity: 1024,
            file_timeout: None,
        }
    }

    /// Bound on records buffered between the producer and the consumer
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_file_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.file_timeout = timeout;
        self
    }

    /// Bootstrap every task with at most `parallelism` files in flight.
    ///
    /// Outcomes come back in task order. Under [`FailurePolicy::FailFast`]
    /// the first real failure cancels `cancel`, which stops the siblings.
    pub async fn run(
        &self,
        instant_time: &str,
        tasks: Vec<FileTask>,
        parallelism: usize,
        policy: FailurePolicy,
        cancel: &CancellationToken,
    ) -> Vec<FileOutcome> {
        let total = tasks.len();
        info!(
            files = total,
            parallelism,
            queue_capacity = self.queue_capacity,
            policy = %policy,
            "Bootstrapping source files"
        );

        let mut outcomes: Vec<(usize, FileOutcome)> = stream::iter(tasks.into_iter().enumerate())
            .map(|(index, task)| {
                let token = cancel.child_token();
                async move {
                    let outcome = self.bootstrap_file(instant_time, task, token).await;
                    match &outcome {
                        Ok((stat, _)) => debug!(
                            file_id = %stat.file_id,
                            records = stat.num_writes,
                            "Completed file {} / {}",
                            index + 1,
                            total
                        ),
                        Err(failure) => {
                            warn!(error = %failure, "Failed file {} / {}", index + 1, total);
                            if policy == FailurePolicy::FailFast && !failure.is_cancellation() {
                                cancel.cancel();
                            }
                        },
                    }
                    (index, outcome)
                }
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Project the key columns of one source file into a new skeleton file
    pub async fn bootstrap_file(
        &self,
        instant_time: &str,
        task: FileTask,
        cancel: CancellationToken,
    ) -> FileOutcome {
        let fail = |stage: PipelineStage, message: String| {
            FileBootstrapError::new(
                task.file.path.clone(),
                task.source_partition_path.clone(),
                stage,
                message,
            )
        };

        if cancel.is_cancelled() {
            return Err(fail(
                PipelineStage::Cancelled,
                "bootstrap cancelled before the file started".to_string(),
            ));
        }

        let stream = match self.open_projected(&task.file.path).await {
            Ok(stream) => stream,
            Err((stage, message)) => return Err(fail(stage, message)),
        };

        let file_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel::<TableRecord>(self.queue_capacity);
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = self.file_timeout.map(|limit| {
            let token = cancel.clone();
            let flag = timed_out.clone();
            tokio::spawn(async move {
                if tokio::time::timeout(limit, token.cancelled()).await.is_err() {
                    flag.store(true, Ordering::SeqCst);
                    token.cancel();
                }
            })
        });

        let producer = {
            let token = cancel.clone();
            let key_generator = self.key_generator.clone();
            let target = task.target_partition_path.clone();
            tokio::task::spawn_blocking(move || {
                let produced = produce(stream, &*key_generator, &target, &tx, &token);
                if produced.is_err() {
                    token.cancel();
                }
                produced
            })
        };

        let consumer = {
            let token = cancel.clone();
            let factory = self.writer_factory.clone();
            let instant = instant_time.to_string();
            let target = task.target_partition_path.clone();
            let file_id = file_id.clone();
            tokio::task::spawn_blocking(move || {
                consume(&*factory, &instant, &target, &file_id, rx, &token)
            })
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let produced = produced.unwrap_or_else(|e| Err((PipelineStage::Join, e.to_string())));
        let consumed = consumed.unwrap_or_else(|e| Err((PipelineStage::Join, e.to_string())));

        let failure = match (&produced, &consumed) {
            (Ok(_), Ok(_)) => None,
            (Err(p), Ok(_)) => Some(p.clone()),
            (Ok(_), Err(c)) => Some(c.clone()),
            (Err(p), Err(c)) => Some(if p.0 == PipelineStage::Cancelled { c.clone() } else { p.clone() }),
        };

        if let Some((stage, message)) = failure {
            if let Ok((_, path)) = &consumed {
                remove_partial(path);
            }
            let (stage, message) = if timed_out.load(Ordering::SeqCst) {
                (
                    PipelineStage::Timeout,
                    format!("file did not finish within {:?}", self.file_timeout.unwrap_or_default()),
                )
            } else {
                (stage, message)
            };
            return Err(fail(stage, message));
        }

        let (stat, _) = match consumed {
            Ok(done) => done,
            Err((stage, message)) => return Err(fail(stage, message)),
        };

        let mapping = BootstrapFileMapping {
            source_base_path: self.source_base_path.clone(),
            source_partition_path: task.source_partition_path.clone(),
            target_partition_path: task.target_partition_path.clone(),
            source_file_status: task.file.clone(),
            generated_file_id: stat.file_id.clone(),
        };
        Ok((stat, mapping))
    }

    async fn open_projected(&self, path: &Path) -> StageResult<RecordStream> {
        let reader = self.reader.clone();
        let key_fields = self.key_generator.record_key_field_names().to_vec();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let schema = reader
                .read_schema(&path)
                .map_err(|e| (PipelineStage::Schema, e.to_string()))?;
            let projection = schema
                .project(&key_fields)
                .map_err(|e| (PipelineStage::Schema, e.to_string()))?;
            reader
                .open(&path, &projection)
                .map_err(|e| (PipelineStage::Open, e.to_string()))
        })
        .await
        .unwrap_or_else(|e| Err((PipelineStage::Join, e.to_string())))
    }
}

fn produce(
    stream: RecordStream,
    key_generator: &dyn KeyGenerator,
    target_partition: &str,
    tx: &mpsc::Sender<TableRecord>,
    token: &CancellationToken,
) -> StageResult<u64> {
    let mut produced = 0u64;
    for item in stream {
        if token.is_cancelled() {
            return Err((PipelineStage::Cancelled, "producer cancelled".to_string()));
        }
        let record = item.map_err(|e| (PipelineStage::Read, e.to_string()))?;
        let key = key_generator
            .record_key(&record)
            .map_err(|e| (PipelineStage::Read, format!("record {}: {}", produced + 1, e)))?;
        if tx
            .blocking_send(TableRecord::key_only(key, target_partition))
            .is_err()
        {
            return Err((
                PipelineStage::Cancelled,
                "consumer stopped accepting records".to_string(),
            ));
        }
        produced += 1;
    }
    Ok(produced)
}

fn consume(
    factory: &dyn TableFileWriterFactory,
    instant_time: &str,
    target_partition: &str,
    file_id: &str,
    mut rx: mpsc::Receiver<TableRecord>,
    token: &CancellationToken,
) -> StageResult<(WriteStat, PathBuf)> {
    let mut writer = factory
        .open(instant_time, target_partition, file_id)
        .map_err(|e| (PipelineStage::Open, e.to_string()))?;
    let path = writer.path().to_path_buf();

    let outcome = loop {
        if token.is_cancelled() {
            break Err((PipelineStage::Cancelled, "consumer cancelled".to_string()));
        }
        match rx.blocking_recv() {
            Some(record) => {
                if let Err(e) = writer.write(&record) {
                    break Err((PipelineStage::Write, e.to_string()));
                }
            },
            None => break Ok(()),
        }
    };
    rx.close();

    let closed = writer.close();
    match (outcome, closed) {
        (Ok(()), Ok(stat)) => Ok((stat, path)),
        (Err(failure), _) => {
            token.cancel();
            remove_partial(&path);
            Err(failure)
        },
        (Ok(()), Err(e)) => {
            token.cancel();
            remove_partial(&path);
            Err((PipelineStage::Close, e.to_string()))
        },
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial table file");
        }
    }
}
