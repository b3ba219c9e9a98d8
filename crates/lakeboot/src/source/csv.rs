use super::{FullRecordDataProvider, RecordStream, SourceFileReader, TableRecordStream};
use crate::error::DataError;
use crate::keygen::KeyGenerator;
use crate::model::TableRecord;
use crate::translator::PartitionPathTranslator;
use ::csv::{ReaderBuilder, StringRecord};
use lakeboot_common::{Schema, SourcePartition, SourceRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Source tag of records produced for full-record bootstrap
pub const BOOTSTRAP_SOURCE_TAG: &str = "bootstrap_source";

/// Reads CSV files whose header row is the schema
#[derive(Debug, Clone)]
pub struct CsvSourceReader {
    delimiter: u8,
}

impl CsvSourceReader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn reader(&self, path: &Path) -> Result<::csv::Reader<std::fs::File>, DataError> {
        Ok(ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)?)
    }
}

impl Default for CsvSourceReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFileReader for CsvSourceReader {
    fn read_schema(&self, path: &Path) -> Result<Schema, DataError> {
        let mut reader = self.reader(path)?;
        let headers = reader.headers()?;
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(DataError::Schema(format!(
                "{} has no header row",
                path.display()
            )));
        }
        Ok(Schema::from_names(headers.iter()))
    }

    fn open(&self, path: &Path, projection: &Schema) -> Result<RecordStream, DataError> {
        let mut reader = self.reader(path)?;
        let headers = reader.headers()?.clone();

        let mut columns = Vec::with_capacity(projection.len());
        for field in &projection.fields {
            let index = headers
                .iter()
                .position(|h| h == field.name)
                .ok_or_else(|| DataError::MissingField {
                    field: field.name.clone(),
                    path: path.to_path_buf(),
                })?;
            columns.push((field.name.clone(), index));
        }

        let path: PathBuf = path.to_path_buf();
        let records = reader
            .into_records()
            .map(move |row| -> Result<SourceRecord, DataError> {
                let row: StringRecord = row?;
                let mut record = SourceRecord::new();
                for (name, index) in &columns {
                    let value = row.get(*index).ok_or_else(|| DataError::MissingField {
                        field: name.clone(),
                        path: path.clone(),
                    })?;
                    record.insert(name.clone(), serde_json::Value::String(value.to_string()));
                }
                Ok(record)
            });

        Ok(Box::new(records))
    }
}

/// Reads every column of the selected partitions into full table records
pub struct CsvFullRecordProvider {
    reader: Arc<dyn SourceFileReader>,
    key_generator: Arc<dyn KeyGenerator>,
    translator: Arc<dyn PartitionPathTranslator>,
}

impl CsvFullRecordProvider {
    pub fn new(
        reader: Arc<dyn SourceFileReader>,
        key_generator: Arc<dyn KeyGenerator>,
        translator: Arc<dyn PartitionPathTranslator>,
    ) -> Self {
        Self {
            reader,
            key_generator,
            translator,
        }
    }
}

impl FullRecordDataProvider for CsvFullRecordProvider {
    fn source_tag(&self) -> &str {
        BOOTSTRAP_SOURCE_TAG
    }

    fn generate_input_records(
        &self,
        source_base_path: &Path,
        partitions: &[SourcePartition],
    ) -> Result<TableRecordStream, DataError> {
        let files: Vec<(String, PathBuf)> = partitions
            .iter()
            .flat_map(|partition| {
                let target = self.translator.translate(&partition.partition_path);
                partition
                    .files
                    .iter()
                    .map(move |file| (target.clone(), file.path.clone()))
            })
            .collect();

        info!(
            source = %source_base_path.display(),
            tag = BOOTSTRAP_SOURCE_TAG,
            partitions = partitions.len(),
            files = files.len(),
            "Streaming full-record bootstrap input"
        );

        let reader = self.reader.clone();
        let key_generator = self.key_generator.clone();
        let records = files
            .into_iter()
            .flat_map(move |(target, path)| -> TableRecordStream {
                let rows = match reader
                    .read_schema(&path)
                    .and_then(|schema| reader.open(&path, &schema))
                {
                    Ok(rows) => rows,
                    Err(e) => return Box::new(std::iter::once(Err(e))),
                };
                debug!(file = %path.display(), partition = %target, "Reading full records");

                let key_generator = key_generator.clone();
                Box::new(rows.map(move |row| -> Result<TableRecord, DataError> {
                    let row = row?;
                    let key = key_generator.record_key(&row)?;
                    Ok(TableRecord::full(key, target.clone(), row.values))
                }))
            });

        Ok(Box::new(records))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::keygen::SimpleKeyGenerator;
    use crate::translator::IdentityTranslator;
    use lakeboot_common::SourceFileStatus;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_projection_only_materializes_requested_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "a.csv", "id,name,city\n1,ann,rome\n2,bob,oslo\n");
        let reader = CsvSourceReader::new();
        let schema = reader.read_schema(&path).unwrap();
        assert_eq!(schema.field_names(), vec!["id", "name", "city"]);

        let projection = schema.project(&["city", "id"]).unwrap();
        let rows: Vec<SourceRecord> = reader
            .open(&path, &projection)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[1].get_text("city").as_deref(), Some("oslo"));
        assert!(rows[1].get("name").is_none());
    }

    #[test]
    fn test_missing_projected_column() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "a.csv", "id,name\n1,ann\n");
        let err = CsvSourceReader::new()
            .open(&path, &Schema::from_names(["uuid"]))
            .err()
            .unwrap();
        assert!(matches!(err, DataError::MissingField { .. }));
    }

    #[test]
    fn test_ragged_row_surfaces_as_stream_error() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "a.csv", "id,name\n1,ann\n2\n");
        let reader = CsvSourceReader::new();
        let results: Vec<_> = reader
            .open(&path, &Schema::from_names(["id"]))
            .unwrap()
            .collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_full_record_provider_keys_and_translates() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "a.csv", "id,name\n1,ann\n2,bob\n");
        let provider = CsvFullRecordProvider::new(
            Arc::new(CsvSourceReader::new()),
            Arc::new(SimpleKeyGenerator::new("id")),
            Arc::new(IdentityTranslator),
        );
        let partition = SourcePartition::new("p2", vec![SourceFileStatus::new(&path, 0, 0)]);

        let records: Vec<TableRecord> = provider
            .generate_input_records(dir.path(), &[partition])
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key.record_key, "1");
        assert_eq!(records[0].partition_path(), "p2");
        assert_eq!(provider.source_tag(), "bootstrap_source");
    }

    #[test]
    fn test_full_record_stream_opens_files_lazily() {
        let dir = TempDir::new().unwrap();
        let good = write(dir.path(), "a.csv", "id,name\n1,ann\n");
        let missing = dir.path().join("gone.csv");
        let provider = CsvFullRecordProvider::new(
            Arc::new(CsvSourceReader::new()),
            Arc::new(SimpleKeyGenerator::new("id")),
            Arc::new(IdentityTranslator),
        );
        let partition = SourcePartition::new(
            "p1",
            vec![SourceFileStatus::new(&good, 0, 0), SourceFileStatus::new(&missing, 0, 0)],
        );

        // Building the stream touches no file
        let mut records = provider
            .generate_input_records(dir.path(), &[partition])
            .unwrap();
        assert_eq!(records.next().unwrap().unwrap().key.record_key, "1");
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }
}
