use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StructuredPayload;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database schema could not be recovered from model output")]
    Unparsed { raw: String },
    #[error("database schema has an unexpected shape: {message}")]
    Shape { message: String, raw: String },
}

impl SchemaError {
    /// Raw model output the schema was read from, for diagnostics.
    pub fn raw(&self) -> &str {
        match self {
            SchemaError::Unparsed { raw } | SchemaError::Shape { raw, .. } => raw,
        }
    }
}

/// `{tables: [{name, columns: [{name, type, foreign_key?}]}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSchema {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

/// Columns come either as objects or as bare names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDef {
    Detailed(ColumnSpec),
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

fn default_column_type() -> String {
    "string".to_string()
}

impl ColumnDef {
    pub fn name(&self) -> &str {
        match self {
            ColumnDef::Detailed(spec) => &spec.name,
            ColumnDef::Bare(name) => name,
        }
    }

    /// Lower-cased declared type; bare columns are strings.
    pub fn column_type(&self) -> String {
        match self {
            ColumnDef::Detailed(spec) => spec.column_type.to_lowercase(),
            ColumnDef::Bare(_) => default_column_type(),
        }
    }

    pub fn foreign_key(&self) -> Option<&str> {
        match self {
            ColumnDef::Detailed(spec) => spec.foreign_key.as_deref(),
            ColumnDef::Bare(_) => None,
        }
    }
}

impl DbSchema {
    /// Interprets the schema stage output. This is where a deferred
    /// recovery failure turns into a parse error.
    pub fn from_payload(payload: &StructuredPayload) -> Result<Self, SchemaError> {
        match payload {
            StructuredPayload::Parsed { raw, value } => serde_json::from_value(value.clone())
                .map_err(|e| SchemaError::Shape {
                    message: e.to_string(),
                    raw: raw.clone(),
                }),
            StructuredPayload::Unparsed(raw) => Err(SchemaError::Unparsed { raw: raw.clone() }),
        }
    }
}
