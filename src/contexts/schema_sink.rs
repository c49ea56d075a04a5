use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::data::{ColumnDef, DbSchema, TableDef};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write schema to {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Destination for an extracted database schema.
pub trait SchemaSink: Send + Sync {
    /// Applies `schema` for the project at `project_dir` and returns a short
    /// description of what was done.
    fn apply(&self, schema: &DbSchema, project_dir: &Path) -> Result<String, SinkError>;
}

/// Writes PostgreSQL DDL into a file inside the project directory.
#[derive(Debug, Clone)]
pub struct DdlFileSink {
    file_name: String,
}

impl Default for DdlFileSink {
    fn default() -> Self {
        Self {
            file_name: "schema.sql".to_string(),
        }
    }
}

impl DdlFileSink {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl SchemaSink for DdlFileSink {
    fn apply(&self, schema: &DbSchema, project_dir: &Path) -> Result<String, SinkError> {
        let path = project_dir.join(&self.file_name);
        let io_error = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(project_dir).map_err(io_error)?;
        fs::write(&path, render_ddl(schema)).map_err(io_error)?;

        tracing::info!(file = %path.display(), tables = schema.tables.len(), "wrote schema DDL");
        Ok(format!(
            "Wrote {} table definition(s) to {}",
            schema.tables.len(),
            self.file_name
        ))
    }
}

/// Renders `CREATE TABLE IF NOT EXISTS` statements for every table.
pub fn render_ddl(schema: &DbSchema) -> String {
    schema
        .tables
        .iter()
        .map(render_table)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_table(table: &TableDef) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| format!("    {} {}", column.name(), column_sql_type(column)))
        .collect();
    if columns.is_empty() {
        return format!("CREATE TABLE IF NOT EXISTS {} ();\n", table.name);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        table.name,
        columns.join(",\n")
    )
}

fn column_sql_type(column: &ColumnDef) -> String {
    if column.name() == "id" {
        return "SERIAL PRIMARY KEY".to_string();
    }
    if let Some(target) = column.foreign_key() {
        return format!("INTEGER REFERENCES {}", reference_target(target));
    }
    match column.column_type().as_str() {
        "integer" | "int" => "INTEGER".to_string(),
        _ => "VARCHAR(255)".to_string(),
    }
}

/// `users(id)` stays as is, `users.id` becomes `users(id)`, a bare table
/// name references its `id` column.
fn reference_target(target: &str) -> String {
    let target = target.trim();
    if target.contains('(') {
        return target.to_string();
    }
    match target.split_once('.') {
        Some((table, column)) => format!("{}({})", table, column),
        None => format!("{}(id)", target),
    }
}
