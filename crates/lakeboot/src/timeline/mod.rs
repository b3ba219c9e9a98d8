//! Append-only instant timeline
//!
//! Every state of an instant is a file under `<table>/.lakeboot/timeline/`:
//!
//! ```text
//! 00000000000001.commit.requested
//! 00000000000001.commit.inflight
//! 00000000000001.commit            <- completed; holds the commit metadata
//! ```
//!
//! Requested and inflight markers are created with create-new semantics, so a
//! second writer racing for the same identity loses. The completed file is
//! staged in a temporary file, synced and renamed without clobbering: readers
//! observe either no completed file or the full metadata. The directory is
//! synced after every new entry.

mod commit;
mod instant;

pub use commit::{CommitMetadata, WriteOperationType, SCHEMA_KEY};
pub use instant::{
    ActionKind, Instant, InstantState, FULL_BOOTSTRAP_INSTANT_TS, METADATA_BOOTSTRAP_INSTANT_TS,
};

use crate::error::TimelineError;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, TimelineError>;

#[derive(Debug, Clone)]
pub struct InstantTimeline {
    dir: PathBuf,
}

impl InstantTimeline {
    /// Open the timeline stored in `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, instant: &Instant) -> PathBuf {
        self.dir.join(instant.file_name())
    }

    /// Reload every instant, each in the most advanced state found on disk, ordered by timestamp
    pub fn instants(&self) -> Result<Vec<Instant>> {
        let mut latest: BTreeMap<(String, ActionKind), Instant> = BTreeMap::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(instant) = Instant::parse_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let key = (instant.timestamp.clone(), instant.action);
            let advances = latest
                .get(&key)
                .map_or(true, |existing| instant.state > existing.state);
            if advances {
                latest.insert(key, instant);
            }
        }

        Ok(latest.into_values().collect())
    }

    /// Current on-disk state of an identity, if any
    pub fn state_of(&self, action: ActionKind, timestamp: &str) -> Result<Option<InstantState>> {
        let mut state = None;
        for candidate in [
            InstantState::Requested,
            InstantState::Inflight,
            InstantState::Completed,
        ] {
            if self.path_of(&Instant::new(action, candidate, timestamp)).exists() {
                state = Some(candidate);
            }
        }
        Ok(state)
    }

    pub fn completed_commits(&self) -> Result<Vec<Instant>> {
        Ok(self
            .instants()?
            .into_iter()
            .filter(|i| i.is_completed() && i.action.is_commit())
            .collect())
    }

    /// Latest completed instant of the commits sub-timeline
    pub fn last_completed_commit(&self) -> Result<Option<Instant>> {
        Ok(self.completed_commits()?.into_iter().max())
    }

    /// Instants that were requested but never completed
    pub fn pending(&self) -> Result<Vec<Instant>> {
        Ok(self
            .instants()?
            .into_iter()
            .filter(|i| !i.is_completed())
            .collect())
    }

    /// Record a new instant in the requested state.
    ///
    /// Fails if the identity exists in any state.
    pub fn create_requested(&self, action: ActionKind, timestamp: &str) -> Result<Instant> {
        let instant = Instant::requested(action, timestamp);
        if self.state_of(action, timestamp)?.is_some() {
            return Err(TimelineError::AlreadyExists(instant.identity()));
        }
        self.create_marker(&instant)?;
        info!(instant = %instant, "Created requested instant");
        Ok(instant)
    }

    /// Move a requested instant to inflight
    pub fn transition_to_inflight(&self, instant: &Instant) -> Result<Instant> {
        self.check_state(instant, InstantState::Requested)?;
        let inflight = instant.with_state(InstantState::Inflight);
        self.create_marker(&inflight)?;
        info!(instant = %inflight, "Transitioned instant to inflight");
        Ok(inflight)
    }

    /// Publish the commit metadata and mark the instant completed in one step
    pub fn transition_to_completed(&self, instant: &Instant, metadata: &[u8]) -> Result<Instant> {
        self.check_state(instant, InstantState::Inflight)?;
        let completed = instant.with_state(InstantState::Completed);
        let target = self.path_of(&completed);

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(metadata)?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                TimelineError::AlreadyExists(completed.identity())
            } else {
                TimelineError::Io(e.error)
            }
        })?;
        sync_dir_or_warn(&self.dir);

        info!(instant = %completed, bytes = metadata.len(), "Completed instant");
        Ok(completed)
    }

    /// Raw metadata of a completed instant
    pub fn read_instant_bytes(&self, instant: &Instant) -> Result<Vec<u8>> {
        let completed = instant.with_state(InstantState::Completed);
        let path = self.path_of(&completed);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TimelineError::NotFound(completed.identity()))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_commit_metadata(&self, instant: &Instant) -> Result<CommitMetadata> {
        let bytes = self.read_instant_bytes(instant)?;
        Ok(CommitMetadata::from_bytes(&bytes)?)
    }

    fn check_state(&self, instant: &Instant, expected: InstantState) -> Result<()> {
        let on_disk = self.state_of(instant.action, &instant.timestamp)?;
        if instant.state != expected || on_disk != Some(expected) {
            let actual = match on_disk {
                Some(state) if instant.state == expected => state.to_string(),
                Some(state) => format!("{} (on disk {})", instant.state, state),
                None => "absent".to_string(),
            };
            return Err(TimelineError::InvalidTransition {
                instant: instant.identity(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn create_marker(&self, instant: &Instant) -> Result<()> {
        let path = self.path_of(instant);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    TimelineError::AlreadyExists(instant.identity())
                } else {
                    TimelineError::Io(e)
                }
            })?;
        file.sync_all()?;
        sync_dir_or_warn(&self.dir);
        debug!(path = %path.display(), "Wrote timeline marker");
        Ok(())
    }
}

/// Sync a directory so that entries created or renamed in it survive a crash
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

/// Directory sync for an entry that is already visible; failures are logged
pub(crate) fn sync_dir_or_warn(dir: &Path) {
    if let Err(e) = sync_dir(dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to sync directory");
    }
}
