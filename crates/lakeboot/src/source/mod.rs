//! Source dataset collaborators: listing, schema discovery and file reading

mod csv;
mod listing;
mod schema;

pub use self::csv::{CsvFullRecordProvider, CsvSourceReader, BOOTSTRAP_SOURCE_TAG};
pub use self::listing::LocalPartitionLister;
pub use self::schema::{FixedSchemaProvider, SourceSchemaProvider};

use crate::error::DataError;
use crate::model::TableRecord;
use lakeboot_common::{Schema, SourcePartition, SourceRecord};
use std::path::Path;

/// Stream of records from one source file
pub type RecordStream = Box<dyn Iterator<Item = Result<SourceRecord, DataError>> + Send>;

/// Lazy stream of full table records handed to the bulk-insert path
pub type TableRecordStream = Box<dyn Iterator<Item = Result<TableRecord, DataError>> + Send>;

/// Lists the leaf partitions of a source dataset that contain data files
pub trait PartitionLister: Send + Sync {
    fn list_leaf_partitions(&self, base_path: &Path) -> Result<Vec<SourcePartition>, DataError>;
}

/// Determines the schema of a source dataset
pub trait SchemaProvider: Send + Sync {
    fn schema(&self, partitions: &[SourcePartition]) -> Result<Schema, DataError>;
}

/// Reads individual source data files
pub trait SourceFileReader: Send + Sync {
    fn read_schema(&self, path: &Path) -> Result<Schema, DataError>;

    /// Open a read stream restricted to the columns of `projection`.
    ///
    /// Columns outside the projection are never materialized.
    fn open(&self, path: &Path, projection: &Schema) -> Result<RecordStream, DataError>;
}

/// Produces full table records for partitions bootstrapped in full-record mode
pub trait FullRecordDataProvider: Send + Sync {
    /// Origin reported in logs and commit metadata
    fn source_tag(&self) -> &str;

    /// Records of `partitions`, produced as the stream is consumed.
    ///
    /// Records of one table partition arrive together.
    fn generate_input_records(
        &self,
        source_base_path: &Path,
        partitions: &[SourcePartition],
    ) -> Result<TableRecordStream, DataError>;
}
