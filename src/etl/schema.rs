//! Target table schemas and projection of merged records onto them.
//!
//! Schemas are resolved by a [`SchemaCatalog`]. The bundled
//! [`JsonSchemaCatalog`] reads BigQuery-style schema files:
//!
//! ```json
//! [{"name": "device", "type": "STRING", "mode": "REQUIRED"},
//!  {"name": "phone_latitude", "type": "FLOAT"}]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::join::record::{self, FieldType, FieldValue, MergedRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: FieldType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetSchema {
    table: String,
    columns: Vec<ColumnDef>,
}

impl TargetSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Builds a schema from a bare column list. Types come from the merged
    /// record's own columns; names it does not know are treated as strings.
    pub fn from_columns<S: AsRef<str>>(table: impl Into<String>, names: &[S]) -> Self {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                ColumnDef {
                    name: name.to_string(),
                    kind: record::column_type(name).unwrap_or(FieldType::String),
                    nullable: true,
                }
            })
            .collect();
        Self::new(table, columns)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One output row; `values[i]` belongs to `schema.columns()[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    pub values: Vec<Option<FieldValue>>,
}

/// Selects and orders the schema's columns from every record. Record fields
/// outside the schema are dropped; schema columns the record lacks are null.
pub fn project(records: &[MergedRecord], schema: &TargetSchema) -> Vec<ProjectedRow> {
    records
        .iter()
        .map(|record| ProjectedRow {
            values: schema
                .columns()
                .iter()
                .map(|column| record.field(&column.name))
                .collect(),
        })
        .collect()
}

/// Resolves a table name into its destination schema.
pub trait SchemaCatalog {
    fn resolve(&self, table: &str) -> Result<TargetSchema>;
}

impl SchemaCatalog for TargetSchema {
    fn resolve(&self, table: &str) -> Result<TargetSchema> {
        if table == self.table {
            Ok(self.clone())
        } else {
            Err(Error::unknown_column(table, "table is not registered"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JsonSchemaCatalog {
    dir: PathBuf,
    files: BTreeMap<String, String>,
}

impl JsonSchemaCatalog {
    pub fn new(dir: impl Into<PathBuf>, files: BTreeMap<String, String>) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    fn load(&self, table: &str, path: &Path) -> Result<TargetSchema> {
        let data = std::fs::read(path).map_err(|err| {
            Error::unknown_column(table, format!("read {}: {err}", path.display()))
        })?;
        let fields: Vec<SchemaField> = serde_json::from_slice(&data).map_err(|err| {
            Error::unknown_column(table, format!("parse {}: {err}", path.display()))
        })?;
        if fields.is_empty() {
            return Err(Error::unknown_column(table, "schema has no columns"));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            if !seen.insert(field.name.clone()) {
                return Err(Error::unknown_column(
                    table,
                    format!("duplicate column {:?}", field.name),
                ));
            }
            let kind = parse_field_type(&field.kind).ok_or_else(|| {
                Error::unknown_column(
                    table,
                    format!("column {:?} has unsupported type {:?}", field.name, field.kind),
                )
            })?;
            let nullable = !field
                .mode
                .as_deref()
                .map(|mode| mode.eq_ignore_ascii_case("REQUIRED"))
                .unwrap_or(false);
            columns.push(ColumnDef {
                name: field.name,
                kind,
                nullable,
            });
        }
        Ok(TargetSchema::new(table, columns))
    }
}

impl SchemaCatalog for JsonSchemaCatalog {
    fn resolve(&self, table: &str) -> Result<TargetSchema> {
        let file = self
            .files
            .get(table)
            .ok_or_else(|| Error::unknown_column(table, "no schema file mapped for table"))?;
        let path = self.dir.join(file);
        log::debug!("resolving schema for {table} from {}", path.display());
        self.load(table, &path)
    }
}

fn parse_field_type(raw: &str) -> Option<FieldType> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "STRING" => Some(FieldType::String),
        "FLOAT" | "FLOAT64" | "NUMERIC" => Some(FieldType::Float),
        "INTEGER" | "INT64" => Some(FieldType::Integer),
        "BOOLEAN" | "BOOL" => Some(FieldType::Boolean),
        "TIMESTAMP" | "DATETIME" => Some(FieldType::Timestamp),
        _ => None,
    }
}
