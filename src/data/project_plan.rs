use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use super::StructuredPayload;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("project plan could not be recovered from model output")]
    Unparsed { raw: String },
    #[error("project plan must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("unsafe entry name '{0}' in project plan")]
    UnsafeName(String),
}

/// A node of the project tree: a directory or a file, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    Dir(DirNode),
    File(FileNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Relative name without the trailing separator. May span several
    /// segments (`app/routers`).
    pub name: String,
    pub children: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub name: String,
    pub content: String,
}

impl PlanNode {
    pub fn name(&self) -> &str {
        match self {
            PlanNode::Dir(dir) => &dir.name,
            PlanNode::File(file) => &file.name,
        }
    }
}

/// The scaffold produced by the last pipeline stage, in plan insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectPlan {
    entries: Vec<PlanNode>,
}

impl ProjectPlan {
    pub fn new(entries: Vec<PlanNode>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanNode] {
        &self.entries
    }

    /// Builds a plan from a recovered payload. An unparsed payload is the
    /// deferred recovery failure and is reported with its raw text.
    pub fn from_payload(payload: &StructuredPayload) -> Result<Self, PlanError> {
        match payload {
            StructuredPayload::Parsed { value, .. } => Self::from_value(value),
            StructuredPayload::Unparsed(raw) => Err(PlanError::Unparsed { raw: raw.clone() }),
        }
    }

    /// Converts the nested JSON description into tagged nodes.
    ///
    /// Keys ending in `/` are directories. A key without the marker whose
    /// value is an object is also read as a directory; any other value is
    /// file content.
    pub fn from_value(value: &Value) -> Result<Self, PlanError> {
        let Value::Object(map) = value else {
            return Err(PlanError::NotAnObject(value_kind(value)));
        };
        Ok(Self {
            entries: convert_entries(map)?,
        })
    }

    /// All files with their paths relative to the plan root, depth first.
    pub fn files(&self) -> Vec<(PathBuf, &str)> {
        let mut out = Vec::new();
        collect_files(&self.entries, Path::new(""), &mut out);
        out
    }
}

fn convert_entries(map: &Map<String, Value>) -> Result<Vec<PlanNode>, PlanError> {
    let mut nodes = Vec::with_capacity(map.len());
    for (key, value) in map {
        let is_dir_marker = key.ends_with('/') || key.ends_with('\\');
        let name = validate_name(key)?;

        let node = match value {
            Value::Object(children) => PlanNode::Dir(DirNode {
                name,
                children: convert_entries(children)?,
            }),
            _ if is_dir_marker => {
                if !value.is_null() {
                    tracing::warn!(
                        directory = %name,
                        "directory entry has non-object content; creating it empty"
                    );
                }
                PlanNode::Dir(DirNode {
                    name,
                    children: Vec::new(),
                })
            }
            other => PlanNode::File(FileNode {
                name,
                content: coerce_content(other),
            }),
        };
        nodes.push(node);
    }
    Ok(nodes)
}

fn coerce_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Strips the directory marker and rejects names that would escape the
/// project root.
fn validate_name(key: &str) -> Result<String, PlanError> {
    let trimmed = key.trim_end_matches(['/', '\\']);
    let unsafe_name = || PlanError::UnsafeName(key.to_string());

    if trimmed.is_empty() || trimmed.starts_with(['/', '\\']) || trimmed.contains(':') {
        return Err(unsafe_name());
    }
    for segment in trimmed.split(['/', '\\']) {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(unsafe_name());
        }
    }

    Ok(trimmed.replace('\\', "/"))
}

fn collect_files<'a>(nodes: &'a [PlanNode], base: &Path, out: &mut Vec<(PathBuf, &'a str)>) {
    for node in nodes {
        match node {
            PlanNode::Dir(dir) => collect_files(&dir.children, &base.join(&dir.name), out),
            PlanNode::File(file) => out.push((base.join(&file.name), file.content.as_str())),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
