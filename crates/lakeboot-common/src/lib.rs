//! lakeboot Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the lakeboot workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LakebootError`] and the crate [`Result`] alias
//! - **Checksums**: SHA-256 helpers used to seal persisted table artifacts
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: source-side data primitives (schemas, records, file listings)
//!
//! # Example
//!
//! ```no_run
//! use lakeboot_common::checksum::sha256_file;
//! use lakeboot_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<String> {
//!     let digest = sha256_file(path)?;
//!     Ok(digest)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LakebootError, Result};
pub use types::{Field, FieldType, Schema, SourceFileStatus, SourcePartition, SourceRecord};
