//! lakeboot
//!
//! Bootstraps an existing partitioned dataset into a table managed by an
//! append-only commit timeline, without necessarily rewriting the data.
//!
//! # Overview
//!
//! - **Mode selection**: every source partition is bootstrapped either
//!   metadata-only (skeleton files holding record keys, plus an index back to
//!   the source files) or full-record (rewritten through the bulk-insert path)
//! - **Key projection**: metadata-only files stream through a bounded
//!   producer/consumer pipeline that reads only the record key columns
//! - **Bootstrap index**: durable partition -> file mappings, written before
//!   the commit completes
//! - **Timeline**: requested -> inflight -> completed instants, at most one
//!   bootstrap per table
//!
//! # Example
//!
//! ```no_run
//! use lakeboot::config::BootstrapConfig;
//! use lakeboot::orchestrator::BootstrapOrchestrator;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = BootstrapConfig::builder("/data/table")
//!         .source_base_path("/data/legacy")
//!         .record_key_fields(["id"])
//!         .build()?;
//!     let mut orchestrator = BootstrapOrchestrator::from_config(&config)?;
//!     let result = orchestrator.execute().await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod bulk_insert;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod keygen;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod selector;
pub mod source;
pub mod table;
pub mod timeline;
pub mod translator;

// Re-export commonly used types
pub use config::BootstrapConfig;
pub use error::{BootstrapError, FileBootstrapError, Result};
pub use model::{BootstrapMode, CommitResult, WriteSummary};
pub use orchestrator::{BootstrapOrchestrator, BootstrapPhase};
pub use pipeline::FailurePolicy;
