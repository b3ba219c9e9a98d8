//! Run-once gating and index/commit atomicity
//!
//! These tests verify:
//! - A second bootstrap is rejected before anything is written
//! - A leftover instant from an interrupted run blocks a rerun
//! - A failed index write never produces a completed commit
//! - A selector that does not cover the listing exactly is rejected before
//!   anything is written

mod common;

use common::{table_data_files, Fixture};
use lakeboot::error::CoverageReport;
use lakeboot::model::BootstrapMode;
use lakeboot::selector::{FullRecordSelector, MetadataOnlySelector, ModeSelection, ModeSelector};
use lakeboot_common::SourcePartition;
use lakeboot::table::{BOOTSTRAP_DIR, META_DIR};
use lakeboot::timeline::{InstantState, METADATA_BOOTSTRAP_INSTANT_TS};
use lakeboot::BootstrapError;
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn test_second_bootstrap_is_rejected() {
    let fx = Fixture::new();
    fx.write_rows("p1", "a.csv", "a", 2);

    let mut first = fx.orchestrator(Arc::new(MetadataOnlySelector)).build();
    first.execute().await.unwrap();
    let before = first.meta_client().active_timeline().unwrap().instants().unwrap();

    let mut second = fx.orchestrator(Arc::new(FullRecordSelector)).build();
    let err = second.execute().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Precondition(_)));
    assert!(err.to_string().contains("completed commit"));

    let after = second.meta_client().active_timeline().unwrap().instants().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_interrupted_run_blocks_rerun() {
    let fx = Fixture::new();
    fx.write_rows("p1", "a.csv", "a", 2);

    let client = fx.meta_client();
    let timeline = client.active_timeline().unwrap();
    let requested = timeline
        .create_requested(client.commit_action(), METADATA_BOOTSTRAP_INSTANT_TS)
        .unwrap();
    timeline.transition_to_inflight(&requested).unwrap();

    let mut orchestrator = fx.orchestrator(Arc::new(MetadataOnlySelector)).build();
    let err = orchestrator.execute().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Timeline(_)));

    assert!(timeline.last_completed_commit().unwrap().is_none());
    assert!(table_data_files(&fx.table()).is_empty());
}

#[tokio::test]
async fn test_unwritable_index_location_leaves_no_completed_commit() {
    let fx = Fixture::new();
    fx.write_rows("p1", "a.csv", "a", 2);
    fx.write_rows("p2", "b.csv", "b", 2);

    let client = fx.meta_client();
    // A plain file where the index directory belongs
    fs::write(client.meta_path().join(BOOTSTRAP_DIR), b"not a directory").unwrap();

    let mut orchestrator = fx.orchestrator(Arc::new(MetadataOnlySelector)).build();
    let err = orchestrator.execute().await.unwrap_err();
    assert!(matches!(err, BootstrapError::IndexWrite(_)));

    let timeline = orchestrator.meta_client().active_timeline().unwrap();
    assert!(timeline.last_completed_commit().unwrap().is_none());
    assert_eq!(
        timeline
            .state_of(orchestrator.meta_client().commit_action(), METADATA_BOOTSTRAP_INSTANT_TS)
            .unwrap(),
        Some(InstantState::Inflight)
    );
    assert!(table_data_files(&fx.table()).is_empty());
}

#[tokio::test]
async fn test_existing_index_is_never_overwritten() {
    let fx = Fixture::new();
    fx.write_rows("p1", "a.csv", "a", 1);

    let index_dir = fx.table().join(META_DIR).join(BOOTSTRAP_DIR);
    let client = fx.meta_client();
    fs::create_dir_all(&index_dir).unwrap();
    fs::write(client.bootstrap_index().path(), b"stale\n").unwrap();

    let mut orchestrator = fx.orchestrator(Arc::new(MetadataOnlySelector)).build();
    let err = orchestrator.execute().await.unwrap_err();
    assert!(matches!(err, BootstrapError::IndexWrite(_)));

    assert_eq!(fs::read(client.bootstrap_index().path()).unwrap(), b"stale\n");
    let timeline = client.active_timeline().unwrap();
    assert!(timeline.completed_commits().unwrap().is_empty());
}

/// Sends the first listed partition to metadata-only and an unlisted one to full-record
struct LeakySelector;

impl ModeSelector for LeakySelector {
    fn select(&self, partitions: &[SourcePartition]) -> ModeSelection {
        let mut selection = ModeSelection::new();
        selection.insert(
            BootstrapMode::MetadataOnly,
            partitions.iter().take(1).map(|p| p.partition_path.clone()).collect(),
        );
        selection.insert(BootstrapMode::FullRecord, vec!["p9".to_string()]);
        selection
    }
}

#[tokio::test]
async fn test_selector_violating_coverage_writes_nothing() {
    let fx = Fixture::new();
    fx.write_rows("p1", "a.csv", "a", 2);
    fx.write_rows("p2", "b.csv", "b", 2);

    let mut orchestrator = fx.orchestrator(Arc::new(LeakySelector)).build();
    let err = orchestrator.execute().await.unwrap_err();

    let BootstrapError::Coverage(report) = &err else {
        panic!("expected a coverage failure, got {err}");
    };
    assert_eq!(
        report,
        &CoverageReport {
            missing: vec!["p2".to_string()],
            unexpected: vec!["p9".to_string()],
            duplicated: vec![],
        }
    );

    let timeline = orchestrator.meta_client().active_timeline().unwrap();
    assert!(timeline.instants().unwrap().is_empty());
    assert!(!orchestrator.meta_client().bootstrap_index().exists());
    assert!(table_data_files(&fx.table()).is_empty());
}
