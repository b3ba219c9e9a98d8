//! Partition mode selection
//!
//! A selector assigns every listed partition to exactly one [`BootstrapMode`].
//! Selectors are chosen in configuration from a closed set
//! ([`SelectorSpec`]); callers embedding the orchestrator can also inject
//! their own [`ModeSelector`].

use crate::error::{BootstrapError, CoverageReport};
use crate::model::BootstrapMode;
use lakeboot_common::SourcePartition;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Mode -> partition paths, in listing order
pub type ModeSelection = BTreeMap<BootstrapMode, Vec<String>>;

pub trait ModeSelector: Send + Sync {
    fn select(&self, partitions: &[SourcePartition]) -> ModeSelection;
}

fn all_in(mode: BootstrapMode, partitions: &[SourcePartition]) -> ModeSelection {
    let mut selection = ModeSelection::new();
    selection.insert(
        mode,
        partitions.iter().map(|p| p.partition_path.clone()).collect(),
    );
    selection
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataOnlySelector;

impl ModeSelector for MetadataOnlySelector {
    fn select(&self, partitions: &[SourcePartition]) -> ModeSelection {
        all_in(BootstrapMode::MetadataOnly, partitions)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FullRecordSelector;

impl ModeSelector for FullRecordSelector {
    fn select(&self, partitions: &[SourcePartition]) -> ModeSelection {
        all_in(BootstrapMode::FullRecord, partitions)
    }
}

/// Partitions whose path matches the pattern get `matched_mode`, all others the other mode
#[derive(Debug, Clone)]
pub struct RegexSelector {
    pattern: Regex,
    matched_mode: BootstrapMode,
}

impl RegexSelector {
    pub fn new(pattern: &str, matched_mode: BootstrapMode) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            matched_mode,
        })
    }
}

impl ModeSelector for RegexSelector {
    fn select(&self, partitions: &[SourcePartition]) -> ModeSelection {
        let mut selection = ModeSelection::new();
        for partition in partitions {
            let mode = if self.pattern.is_match(&partition.partition_path) {
                self.matched_mode
            } else {
                self.matched_mode.other()
            };
            selection
                .entry(mode)
                .or_default()
                .push(partition.partition_path.clone());
        }
        selection
    }
}

/// Selector choice as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectorSpec {
    #[default]
    MetadataOnly,
    FullRecord,
    Regex {
        pattern: String,
        matched_mode: BootstrapMode,
    },
}

impl SelectorSpec {
    pub fn build(&self) -> Result<Arc<dyn ModeSelector>, BootstrapError> {
        Ok(match self {
            SelectorSpec::MetadataOnly => Arc::new(MetadataOnlySelector),
            SelectorSpec::FullRecord => Arc::new(FullRecordSelector),
            SelectorSpec::Regex {
                pattern,
                matched_mode,
            } => Arc::new(RegexSelector::new(pattern, *matched_mode).map_err(|e| {
                BootstrapError::Precondition(format!("invalid selector regex '{}': {}", pattern, e))
            })?),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectorSpec::MetadataOnly => "metadata_only",
            SelectorSpec::FullRecord => "full_record",
            SelectorSpec::Regex { .. } => "regex",
        }
    }
}

/// Verify that `selection` assigns every listed partition exactly once and nothing else
pub fn check_coverage(
    partitions: &[SourcePartition],
    selection: &ModeSelection,
) -> Result<(), CoverageReport> {
    let listed: BTreeSet<&str> = partitions.iter().map(|p| p.partition_path.as_str()).collect();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut duplicated: BTreeSet<&str> = BTreeSet::new();
    for path in selection.values().flatten() {
        if !seen.insert(path.as_str()) {
            duplicated.insert(path.as_str());
        }
    }

    let report = CoverageReport {
        missing: listed.difference(&seen).map(|s| s.to_string()).collect(),
        unexpected: seen.difference(&listed).map(|s| s.to_string()).collect(),
        duplicated: duplicated.into_iter().map(str::to_string).collect(),
    };

    if report.is_clean() {
        Ok(())
    } else {
        Err(report)
    }
}
