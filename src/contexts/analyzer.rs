//! End-to-end analysis of a requirements document: extraction pipeline,
//! schema parsing, project generation, refinement and documentation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::code_refiner::{CodeFixer, CodeRefiner, ModelCodeFixer};
use super::document_reader::{self, DocumentError};
use super::documentation::{Documentation, DocumentationLinks};
use super::environment::{EnvironmentSetup, VenvSetup};
use super::file_cache::FileCache;
use super::materializer::materialize;
use super::pipeline::{Pipeline, PipelineError};
use super::schema_sink::{DdlFileSink, SchemaSink};
use crate::clients::{CachedCompletion, GroqClient, model_hash};
use crate::data::{
    Completion, DbSchema, PipelineState, ProjectPlan, RefinementStats, SchemaError, StepOutcome,
    StructuredPayload, TransportError,
};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Document(#[from] DocumentError),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to parse database schema: {0}")]
    Schema(#[from] SchemaError),
}

impl AnalysisError {
    pub fn raw_db_schema(&self) -> Option<&str> {
        match self {
            AnalysisError::Schema(e) => Some(e.raw()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectGeneration {
    pub success: bool,
    pub message: String,
    pub virtual_env: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub api_endpoints: Value,
    pub business_logic: Value,
    pub auth_requirements: Value,
    pub db_schema: Value,
    pub project_generation: ProjectGeneration,
    pub documentation: DocumentationLinks,
}

/// Body returned for every analysis request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResponse {
    Success(AnalysisReport),
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_db_schema: Option<String>,
    },
}

impl AnalysisResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResponse::Success(_))
    }

    pub fn from_error(error: &AnalysisError) -> Self {
        AnalysisResponse::Error {
            message: error.to_string(),
            raw_db_schema: error.raw_db_schema().map(str::to_string),
        }
    }
}

impl From<Result<AnalysisReport, AnalysisError>> for AnalysisResponse {
    fn from(result: Result<AnalysisReport, AnalysisError>) -> Self {
        match result {
            Ok(report) => AnalysisResponse::Success(report),
            Err(e) => AnalysisResponse::from_error(&e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub output_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub max_refine_iterations: usize,
    pub refine_jobs: usize,
    /// Skips environment setup.
    pub dry_run: bool,
}

impl AnalyzerOptions {
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            docs_dir: settings.docs_dir.clone(),
            max_refine_iterations: settings.max_refine_iterations,
            refine_jobs: settings.refine_jobs,
            dry_run,
        }
    }
}

/// Builds the configured model client, wrapped in an on-disk response cache
/// when `cache_dir` is set.
pub fn completion_from_settings(settings: &Settings) -> Result<Arc<dyn Completion>, TransportError> {
    let client = GroqClient::new(settings.groq_config())?;
    Ok(match &settings.cache_dir {
        Some(dir) => {
            let cache = FileCache::new(Some(dir.clone()), model_hash(&settings.model));
            Arc::new(CachedCompletion::new(client, cache))
        }
        None => Arc::new(client),
    })
}

pub struct Analyzer {
    client: Arc<dyn Completion>,
    fixer: Arc<dyn CodeFixer>,
    schema_sink: Arc<dyn SchemaSink>,
    environment: Arc<dyn EnvironmentSetup>,
    options: AnalyzerOptions,
    run_lock: Mutex<()>,
}

impl Analyzer {
    pub fn new(client: Arc<dyn Completion>, options: AnalyzerOptions) -> Self {
        Self {
            fixer: Arc::new(ModelCodeFixer::new(client.clone())),
            client,
            schema_sink: Arc::new(DdlFileSink::default()),
            environment: Arc::new(VenvSetup::default()),
            options,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn CodeFixer>) -> Self {
        self.fixer = fixer;
        self
    }

    pub fn with_schema_sink(mut self, sink: Arc<dyn SchemaSink>) -> Self {
        self.schema_sink = sink;
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentSetup>) -> Self {
        self.environment = environment;
        self
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Reads an uploaded document and analyzes it.
    pub fn analyze_document(&self, file_name: &str, bytes: &[u8]) -> AnalysisResponse {
        let result = document_reader::read_document(file_name, bytes)
            .map_err(AnalysisError::from)
            .and_then(|text| self.run(&text));
        result.into()
    }

    pub fn analyze(&self, document_text: &str) -> AnalysisResponse {
        self.run(document_text).into()
    }

    /// Runs one analysis. Concurrent calls are serialized so two runs never
    /// write the same output tree at once.
    pub fn run(&self, document_text: &str) -> Result<AnalysisReport, AnalysisError> {
        let _guard = self
            .run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let state = Pipeline::new(&*self.client).run(document_text)?;

        let schema_payload = payload_or_empty(state.db_schema());
        let schema = DbSchema::from_payload(&schema_payload)?;

        let project_generation = self.generate_project(&state, &schema);

        let documentation = Documentation::generate(&state, Utc::now());
        if let Err(e) = documentation.write_to(&self.options.docs_dir) {
            tracing::warn!(error = %e, "documentation could not be written");
        }

        Ok(AnalysisReport {
            api_endpoints: json_of(state.api_spec()),
            business_logic: json_of(state.business_logic()),
            auth_requirements: json_of(state.auth_spec()),
            db_schema: schema_payload.to_json(),
            project_generation,
            documentation: DocumentationLinks::default(),
        })
    }

    fn generate_project(&self, state: &PipelineState, schema: &DbSchema) -> ProjectGeneration {
        let root = &self.options.output_dir;
        let plan_payload = payload_or_empty(state.project_plan());

        let materialized = ProjectPlan::from_payload(&plan_payload)
            .map_err(|e| e.to_string())
            .and_then(|plan| materialize(&plan, root).map_err(|e| e.to_string()));
        let report = match materialized {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "project generation failed");
                return ProjectGeneration {
                    success: false,
                    message: format!("Failed to generate project structure: {}", e),
                    virtual_env: StepOutcome::failed("Skipped: project generation failed"),
                    refinement: None,
                };
            }
        };

        let mut message = format!(
            "Project structure generated at {} ({} files)",
            root.display(),
            report.files.len()
        );
        match self.schema_sink.apply(schema, root) {
            Ok(note) => {
                message.push_str("; ");
                message.push_str(&note);
            }
            Err(e) => tracing::warn!(error = %e, "schema could not be applied"),
        }

        let refiner = CodeRefiner::new(self.options.max_refine_iterations);
        let refinement = match refiner.refine_project(root, self.fixer.as_ref(), self.options.refine_jobs) {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "refinement skipped");
                None
            }
        };

        let virtual_env = if self.options.dry_run {
            StepOutcome::ok("Skipped: dry run")
        } else {
            self.environment.setup(root)
        };

        ProjectGeneration {
            success: true,
            message,
            virtual_env,
            refinement,
        }
    }
}

fn payload_or_empty(payload: Option<&StructuredPayload>) -> StructuredPayload {
    payload
        .cloned()
        .unwrap_or_else(|| StructuredPayload::Unparsed(String::new()))
}

fn json_of(payload: Option<&StructuredPayload>) -> Value {
    payload.map(StructuredPayload::to_json).unwrap_or(Value::Null)
}
