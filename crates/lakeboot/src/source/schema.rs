use super::{SchemaProvider, SourceFileReader};
use crate::error::DataError;
use lakeboot_common::{Schema, SourcePartition};
use std::sync::Arc;
use tracing::{debug, warn};

/// Infers the dataset schema from one readable file of every partition.
///
/// An unreadable sample is skipped in favour of the next file of its partition;
/// the pipeline reports that file on its own. Inference fails only when no file
/// of the listing yields a schema.
pub struct SourceSchemaProvider {
    reader: Arc<dyn SourceFileReader>,
}

impl SourceSchemaProvider {
    pub fn new(reader: Arc<dyn SourceFileReader>) -> Self {
        Self { reader }
    }

    fn sample(&self, partition: &SourcePartition) -> Option<Schema> {
        partition.files.iter().find_map(|file| {
            match self.reader.read_schema(&file.path) {
                Ok(schema) => Some(schema),
                Err(e) => {
                    warn!(
                        file = %file.path.display(),
                        partition = %partition.partition_path,
                        error = %e,
                        "Skipping unreadable schema sample"
                    );
                    None
                },
            }
        })
    }
}

impl SchemaProvider for SourceSchemaProvider {
    fn schema(&self, partitions: &[SourcePartition]) -> Result<Schema, DataError> {
        let mut merged = Schema::default();
        for partition in partitions {
            if let Some(schema) = self.sample(partition) {
                merged = merged.merge(&schema)?;
            }
        }

        if merged.is_empty() {
            return Err(DataError::Schema(
                "no readable source file available to infer the schema".to_string(),
            ));
        }
        debug!(fields = ?merged.field_names(), "Inferred source schema");
        Ok(merged)
    }
}

/// Schema supplied up front instead of inferred
#[derive(Debug, Clone)]
pub struct FixedSchemaProvider {
    schema: Schema,
}

impl FixedSchemaProvider {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl SchemaProvider for FixedSchemaProvider {
    fn schema(&self, _partitions: &[SourcePartition]) -> Result<Schema, DataError> {
        Ok(self.schema.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::CsvSourceReader;
    use lakeboot_common::SourceFileStatus;
    use tempfile::TempDir;

    #[test]
    fn test_merges_samples_in_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        std::fs::write(&a, "id,name\n1,x\n").unwrap();
        std::fs::write(&b, "id,city\n1,y\n").unwrap();

        let partitions = vec![
            SourcePartition::new("p1", vec![SourceFileStatus::new(&a, 0, 0)]),
            SourcePartition::new("p2", vec![SourceFileStatus::new(&b, 0, 0)]),
        ];
        let schema = SourceSchemaProvider::new(Arc::new(CsvSourceReader::new()))
            .schema(&partitions)
            .unwrap();
        assert_eq!(schema.field_names(), vec!["id", "name", "city"]);
    }

    #[test]
    fn test_no_samples() {
        let provider = SourceSchemaProvider::new(Arc::new(CsvSourceReader::new()));
        assert!(provider.schema(&[SourcePartition::new("p1", vec![])]).is_err());
    }

    #[test]
    fn test_unreadable_sample_falls_back_to_next_file() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("a.csv");
        let good = dir.path().join("b.csv");
        std::fs::write(&empty, "").unwrap();
        std::fs::write(&good, "id,name\n1,x\n").unwrap();

        let partitions = vec![SourcePartition::new(
            "p1",
            vec![SourceFileStatus::new(&empty, 0, 0), SourceFileStatus::new(&good, 0, 0)],
        )];
        let schema = SourceSchemaProvider::new(Arc::new(CsvSourceReader::new()))
            .schema(&partitions)
            .unwrap();
        assert_eq!(schema.field_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_no_readable_file_anywhere() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("a.csv");
        std::fs::write(&empty, "").unwrap();

        let partitions = vec![SourcePartition::new("p1", vec![SourceFileStatus::new(&empty, 0, 0)])];
        let err = SourceSchemaProvider::new(Arc::new(CsvSourceReader::new()))
            .schema(&partitions)
            .unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
    }

    #[test]
    fn test_fixed_schema_ignores_listing() {
        let schema = Schema::from_names(["id"]);
        let provider = FixedSchemaProvider::new(schema.clone());
        assert_eq!(provider.schema(&[]).unwrap(), schema);
    }
}
