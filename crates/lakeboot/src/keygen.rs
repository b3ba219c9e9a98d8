//! Record key generators

use crate::error::DataError;
use lakeboot_common::SourceRecord;
use std::sync::Arc;

/// Placeholder for a null key part of a composite key
pub const NULL_RECORDKEY_PLACEHOLDER: &str = "__null__";
/// Placeholder for an empty key part of a composite key
pub const EMPTY_RECORDKEY_PLACEHOLDER: &str = "__empty__";

/// Derives the record key of a source record from a fixed set of fields
pub trait KeyGenerator: Send + Sync {
    /// Fields the key is built from; these are the only columns the
    /// metadata bootstrap reads out of a source file
    fn record_key_field_names(&self) -> &[String];

    fn record_key(&self, record: &SourceRecord) -> Result<String, DataError>;
}

/// Key made of one field; null or empty values are rejected
#[derive(Debug, Clone)]
pub struct SimpleKeyGenerator {
    fields: Vec<String>,
}

impl SimpleKeyGenerator {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            fields: vec![field.into()],
        }
    }
}

impl KeyGenerator for SimpleKeyGenerator {
    fn record_key_field_names(&self) -> &[String] {
        &self.fields
    }

    fn record_key(&self, record: &SourceRecord) -> Result<String, DataError> {
        let field = &self.fields[0];
        match record.get_text(field) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(DataError::RecordKey(format!(
                "record key field '{}' is null or empty",
                field
            ))),
        }
    }
}

/// Key of the form `f1:v1,f2:v2`
#[derive(Debug, Clone)]
pub struct ComplexKeyGenerator {
    fields: Vec<String>,
}

impl ComplexKeyGenerator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl KeyGenerator for ComplexKeyGenerator {
    fn record_key_field_names(&self) -> &[String] {
        &self.fields
    }

    fn record_key(&self, record: &SourceRecord) -> Result<String, DataError> {
        let mut all_missing = true;
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                let value = match record.get_text(field) {
                    None => NULL_RECORDKEY_PLACEHOLDER.to_string(),
                    Some(v) if v.is_empty() => EMPTY_RECORDKEY_PLACEHOLDER.to_string(),
                    Some(v) => {
                        all_missing = false;
                        v
                    },
                };
                format!("{}:{}", field, value)
            })
            .collect();

        if all_missing {
            return Err(DataError::RecordKey(format!(
                "all record key fields [{}] are null or empty",
                self.fields.join(", ")
            )));
        }
        Ok(parts.join(","))
    }
}

/// Pick the generator for a list of key fields: one field is a simple key,
/// several make a composite key
pub fn key_generator_for(fields: &[String]) -> Result<Arc<dyn KeyGenerator>, DataError> {
    let fields: Vec<String> = fields
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    match fields.len() {
        0 => Err(DataError::RecordKey(
            "no record key fields configured".to_string(),
        )),
        1 => Ok(Arc::new(SimpleKeyGenerator::new(fields[0].clone()))),
        _ => Ok(Arc::new(ComplexKeyGenerator::new(fields))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_key() {
        let keygen = SimpleKeyGenerator::new("id");
        let record = SourceRecord::new().with("id", "k-7");
        assert_eq!(keygen.record_key(&record).unwrap(), "k-7");

        assert!(keygen.record_key(&SourceRecord::new().with("id", "")).is_err());
        assert!(keygen.record_key(&SourceRecord::new()).is_err());
    }

    #[test]
    fn test_complex_key_with_placeholders() {
        let keygen = ComplexKeyGenerator::new(["region", "id", "day"]);
        let record = SourceRecord::new().with("region", "").with("id", "42");
        assert_eq!(
            keygen.record_key(&record).unwrap(),
            "region:__empty__,id:42,day:__null__"
        );
    }

    #[test]
    fn test_complex_key_all_missing() {
        let keygen = ComplexKeyGenerator::new(["a", "b"]);
        let record = SourceRecord::new().with("a", "");
        assert!(keygen.record_key(&record).is_err());
    }

    #[test]
    fn test_generator_selection() {
        let simple = key_generator_for(&["id".to_string()]).unwrap();
        assert_eq!(simple.record_key_field_names(), ["id".to_string()]);

        let complex = key_generator_for(&["a".to_string(), " b ".to_string()]).unwrap();
        let key = complex
            .record_key(&SourceRecord::new().with("a", "1").with("b", "2"))
            .unwrap();
        assert_eq!(key, "a:1,b:2");

        assert!(key_generator_for(&[" ".to_string()]).is_err());
    }
}
