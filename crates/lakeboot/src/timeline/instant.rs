//! Instants: the unit of change on the table timeline

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Reserved timestamp of the metadata-only bootstrap commit
pub const METADATA_BOOTSTRAP_INSTANT_TS: &str = "00000000000001";

/// Reserved timestamp of the full-record bootstrap commit; sorts after the metadata one
pub const FULL_BOOTSTRAP_INSTANT_TS: &str = "00000000000002";

/// Kind of action recorded by an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Commit of a copy-on-write table
    Commit,
    /// Commit of a merge-on-read table
    DeltaCommit,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Commit => "commit",
            ActionKind::DeltaCommit => "deltacommit",
        }
    }

    /// Both kinds belong to the commits sub-timeline
    pub fn is_commit(&self) -> bool {
        matches!(self, ActionKind::Commit | ActionKind::DeltaCommit)
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ActionKind::Commit),
            "deltacommit" => Ok(ActionKind::DeltaCommit),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state; only ever advances Requested -> Inflight -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstantState {
    Requested,
    Inflight,
    Completed,
}

impl InstantState {
    fn suffix(&self) -> Option<&'static str> {
        match self {
            InstantState::Requested => Some("requested"),
            InstantState::Inflight => Some("inflight"),
            InstantState::Completed => None,
        }
    }
}

impl std::fmt::Display for InstantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstantState::Requested => "requested",
            InstantState::Inflight => "inflight",
            InstantState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// A point on the timeline, identified by `(action, timestamp)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    pub action: ActionKind,
    pub state: InstantState,
    pub timestamp: String,
}

impl Instant {
    pub fn new(action: ActionKind, state: InstantState, timestamp: impl Into<String>) -> Self {
        Self {
            action,
            state,
            timestamp: timestamp.into(),
        }
    }

    pub fn requested(action: ActionKind, timestamp: impl Into<String>) -> Self {
        Self::new(action, InstantState::Requested, timestamp)
    }

    pub fn is_completed(&self) -> bool {
        self.state == InstantState::Completed
    }

    pub fn with_state(&self, state: InstantState) -> Self {
        Self::new(self.action, state, self.timestamp.clone())
    }

    /// `(action, timestamp)` rendered for messages, e.g. `00000000000001.commit`
    pub fn identity(&self) -> String {
        format!("{}.{}", self.timestamp, self.action)
    }

    /// Name of the file holding this instant in this state
    pub fn file_name(&self) -> String {
        match self.state.suffix() {
            Some(suffix) => format!("{}.{}.{}", self.timestamp, self.action, suffix),
            None => format!("{}.{}", self.timestamp, self.action),
        }
    }

    /// Parse a timeline file name; `None` for anything that is not an instant file
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let mut parts = name.split('.');
        let timestamp = parts.next()?;
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let action: ActionKind = parts.next()?.parse().ok()?;
        let state = match parts.next() {
            None => InstantState::Completed,
            Some("requested") => InstantState::Requested,
            Some("inflight") => InstantState::Inflight,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(action, state, timestamp))
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.action.cmp(&other.action))
            .then(self.state.cmp(&other.state))
    }
}

impl std::fmt::Display for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}__{}__{}]", self.timestamp, self.action, self.state)
    }
}
