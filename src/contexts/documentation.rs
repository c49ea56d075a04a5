//! Project documentation rendered from the extraction results.
//!
//! Rendering is deterministic for a given state and timestamp; no model is
//! consulted. The workflow graphs are derived from [`STAGES`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::pipeline::STAGES;
use crate::data::{PipelineState, ProjectPlan, StructuredPayload};

pub const README_FILE: &str = "README.md";
pub const API_FILE: &str = "API.md";
pub const MERMAID_FILE: &str = "workflow.mmd";
pub const DOT_FILE: &str = "workflow.dot";

/// URL prefix the docs directory is served under.
pub const DOCS_MOUNT: &str = "/docs/static";

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("failed to write documentation file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Documentation {
    pub readme: String,
    pub api_documentation: String,
    pub workflow_diagram: String,
    pub workflow_graph: String,
}

/// Where each written document can be fetched from the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentationLinks {
    pub readme: String,
    pub api_documentation: String,
    pub workflow_diagram: String,
    pub workflow_graph: String,
}

impl Default for DocumentationLinks {
    fn default() -> Self {
        let link = |file: &str| format!("{}/{}", DOCS_MOUNT, file);
        Self {
            readme: link(README_FILE),
            api_documentation: link(API_FILE),
            workflow_diagram: link(MERMAID_FILE),
            workflow_graph: link(DOT_FILE),
        }
    }
}

impl Documentation {
    pub fn generate(state: &PipelineState, generated_at: DateTime<Utc>) -> Self {
        Self {
            readme: render_readme(state, generated_at),
            api_documentation: render_api(state.api_spec()),
            workflow_diagram: render_mermaid(),
            workflow_graph: render_dot(),
        }
    }

    /// Writes the four documents into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, DocsError> {
        fs::create_dir_all(dir).map_err(|source| DocsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let files = [
            (README_FILE, &self.readme),
            (API_FILE, &self.api_documentation),
            (MERMAID_FILE, &self.workflow_diagram),
            (DOT_FILE, &self.workflow_graph),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let path = dir.join(name);
            fs::write(&path, content).map_err(|source| DocsError::Io {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        tracing::debug!(dir = %dir.display(), "documentation written");
        Ok(written)
    }
}

fn render_readme(state: &PipelineState, generated_at: DateTime<Utc>) -> String {
    let mut out = String::from("# Generated Project\n\n");
    out.push_str(&format!(
        "_Generated on {}_\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("## Workflow\n\n");
    for (i, stage) in STAGES.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, stage.label));
    }
    out.push_str(&format!(
        "\nSee [`{}`]({}) for the endpoint reference, `{}` and `{}` for the workflow graph.\n\n",
        API_FILE, API_FILE, MERMAID_FILE, DOT_FILE
    ));

    push_section(&mut out, "Business Logic", state.business_logic());
    push_section(&mut out, "Authentication & Authorization", state.auth_spec());
    push_section(&mut out, "Database Schema", state.db_schema());

    let files = state
        .project_plan()
        .and_then(|payload| ProjectPlan::from_payload(payload).ok())
        .map(|plan| {
            plan.files()
                .into_iter()
                .map(|(path, _)| path.to_string_lossy().replace('\\', "/"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !files.is_empty() {
        out.push_str("## Project Structure\n\n```\n");
        for file in files {
            out.push_str(&file);
            out.push('\n');
        }
        out.push_str("```\n");
    }
    out
}

fn push_section(out: &mut String, title: &str, payload: Option<&StructuredPayload>) {
    out.push_str(&format!("## {}\n\n", title));
    match payload {
        Some(StructuredPayload::Parsed { value, .. }) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            out.push_str(&format!("```json\n{}\n```\n\n", pretty));
        }
        Some(StructuredPayload::Unparsed(text)) => {
            out.push_str(text.trim());
            out.push_str("\n\n");
        }
        None => out.push_str("_Not available._\n\n"),
    }
}

fn render_api(api_spec: Option<&StructuredPayload>) -> String {
    let mut out = String::from("# API Documentation\n\n");
    let endpoints = api_spec.and_then(StructuredPayload::value).and_then(endpoint_list);

    match (endpoints, api_spec) {
        (Some(endpoints), _) if !endpoints.is_empty() => {
            out.push_str("| Method | Path | Description |\n|---|---|---|\n");
            for endpoint in endpoints {
                out.push_str(&format!(
                    "| {} | {} | {} |\n",
                    cell(endpoint, &["method"]).to_uppercase(),
                    cell(endpoint, &["path", "endpoint", "url"]),
                    cell(endpoint, &["description", "summary"]),
                ));
            }
        }
        (_, Some(payload)) => {
            out.push_str("```\n");
            out.push_str(payload.as_text().trim());
            out.push_str("\n```\n");
        }
        (_, None) => out.push_str("_No API endpoints were extracted._\n"),
    }
    out
}

/// `{"endpoints": [...]}` or a bare array.
fn endpoint_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("endpoints")
            .or_else(|| map.get("api_endpoints"))
            .and_then(Value::as_array),
        _ => None,
    }
}

fn cell(endpoint: &Value, keys: &[&str]) -> String {
    let text = keys
        .iter()
        .find_map(|key| endpoint.get(*key))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn render_mermaid() -> String {
    let mut out = String::from("graph TD\n");
    out.push_str("    start([Start])\n");
    for stage in STAGES.iter() {
        out.push_str(&format!("    {}[\"{}\"]\n", stage.name, stage.label));
    }
    out.push_str("    finish([End])\n");

    let mut previous = "start";
    for stage in STAGES.iter() {
        out.push_str(&format!("    {} --> {}\n", previous, stage.name));
        previous = stage.name;
    }
    out.push_str(&format!("    {} --> finish\n", previous));
    out
}

pub fn render_dot() -> String {
    let mut out = String::from("digraph workflow {\n    rankdir=LR;\n    node [shape=box];\n");
    for stage in STAGES.iter() {
        out.push_str(&format!("    {} [label=\"{}\"];\n", stage.name, stage.label));
    }
    for pair in STAGES.windows(2) {
        out.push_str(&format!("    {} -> {};\n", pair[0].name, pair[1].name));
    }
    out.push_str("}\n");
    out
}
