//! Source-side data primitives shared across lakeboot crates

use crate::error::{LakebootError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Logical type of a column in a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Long,
    Double,
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Long => write!(f, "long"),
            FieldType::Double => write!(f, "double"),
            FieldType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

/// Ordered set of columns describing a source file or a table.
///
/// Field order is significant: readers use it to map projected columns back
/// to their position in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build an all-string schema from column names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names
                .into_iter()
                .map(|name| Field::new(name, FieldType::String))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Restrict the schema to the named columns, in the order they are requested.
    ///
    /// Fails when any requested column is absent.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Schema> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let field = self.field(name).ok_or_else(|| {
                LakebootError::Schema(format!(
                    "field '{}' not found in schema [{}]",
                    name,
                    self.field_names().join(", ")
                ))
            })?;
            if !fields.iter().any(|f: &Field| f.name == field.name) {
                fields.push(field.clone());
            }
        }
        Ok(Schema { fields })
    }

    /// Union of two schemas, keeping the first-seen order of columns.
    ///
    /// A column present in both with different types is a conflict.
    pub fn merge(&self, other: &Schema) -> Result<Schema> {
        let mut merged = self.clone();
        for field in &other.fields {
            match merged.field(&field.name) {
                Some(existing) if existing.field_type != field.field_type => {
                    return Err(LakebootError::Schema(format!(
                        "field '{}' has conflicting types {} and {}",
                        field.name, existing.field_type, field.field_type
                    )));
                },
                Some(_) => {},
                None => merged.fields.push(field.clone()),
            }
        }
        Ok(merged)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A single record read from a source file, possibly under a projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    pub values: BTreeMap<String, serde_json::Value>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }

    /// Field rendered as text; `None` for missing or JSON null values
    pub fn get_text(&self, field: &str) -> Option<String> {
        match self.values.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Listing metadata of one source data file.
///
/// Borrowed from the filesystem listing; the bootstrap never mutates source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileStatus {
    pub path: PathBuf,
    pub length: u64,
    /// Milliseconds since the Unix epoch
    pub modification_time: i64,
}

impl SourceFileStatus {
    pub fn new(path: impl Into<PathBuf>, length: u64, modification_time: i64) -> Self {
        Self {
            path: path.into(),
            length,
            modification_time,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// A leaf folder of the source tree together with its data files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePartition {
    /// Path relative to the source base path, `/`-separated; empty for an unpartitioned source
    pub partition_path: String,
    pub files: Vec<SourceFileStatus>,
}

impl SourcePartition {
    pub fn new(partition_path: impl Into<String>, files: Vec<SourceFileStatus>) -> Self {
        Self {
            partition_path: partition_path.into(),
            files,
        }
    }
}
