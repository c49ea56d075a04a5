//! The five-stage extraction pipeline.
//!
//! Stages run in a fixed linear order and each one reads only the state
//! fields it declares. A stage whose response cannot be recovered as JSON
//! still records the raw text and the pipeline moves on; only a failed model
//! call stops the run.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::prompt_template::{self, PopulateError};
use super::structured_extractor::recover;
use crate::data::{Completion, PipelineState, StateError, StateField, TransportError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed to call the model: {source}")]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[error("stage '{stage}' could not build its prompt: {source}")]
    Prompt {
        stage: &'static str,
        source: PopulateError,
    },
    #[error("stage '{stage}' could not record its output: {source}")]
    State {
        stage: &'static str,
        source: StateError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageId {
    Api,
    Logic,
    Auth,
    DbSchema,
    ProjectPlan,
}

impl StageId {
    pub const INITIAL: StageId = StageId::Api;

    /// The only transition out of this state; `None` for the terminal stage.
    pub const fn next(self) -> Option<StageId> {
        match self {
            StageId::Api => Some(StageId::Logic),
            StageId::Logic => Some(StageId::Auth),
            StageId::Auth => Some(StageId::DbSchema),
            StageId::DbSchema => Some(StageId::ProjectPlan),
            StageId::ProjectPlan => None,
        }
    }

    pub fn descriptor(self) -> &'static ExtractionStage {
        match self {
            StageId::Api => &STAGES[0],
            StageId::Logic => &STAGES[1],
            StageId::Auth => &STAGES[2],
            StageId::DbSchema => &STAGES[3],
            StageId::ProjectPlan => &STAGES[4],
        }
    }
}

/// Static description of one extraction step.
#[derive(Debug)]
pub struct ExtractionStage {
    pub id: StageId,
    pub name: &'static str,
    pub label: &'static str,
    pub reads: &'static [StateField],
    pub writes: StateField,
    template: &'static str,
}

impl ExtractionStage {
    /// The subset of `state` this stage is allowed to see, keyed by field.
    pub fn input_view(&self, state: &PipelineState) -> Value {
        let mut view = Map::new();
        for field in self.reads {
            if let Some(text) = state.field_text(*field) {
                view.insert(field.key().to_string(), Value::String(text.to_string()));
            }
        }
        Value::Object(view)
    }

    /// Deterministic prompt built from the declared inputs only.
    pub fn build_prompt(&self, state: &PipelineState) -> Result<String, PopulateError> {
        prompt_template::populate(self.template, &self.input_view(state))
    }
}

pub static STAGES: [ExtractionStage; 5] = [
    ExtractionStage {
        id: StageId::Api,
        name: "extract_api",
        label: "Extract API Endpoints",
        reads: &[StateField::DocumentText],
        writes: StateField::ApiSpec,
        template: API_TEMPLATE,
    },
    ExtractionStage {
        id: StageId::Logic,
        name: "extract_logic",
        label: "Extract Business Logic",
        reads: &[StateField::ApiSpec],
        writes: StateField::BusinessLogic,
        template: LOGIC_TEMPLATE,
    },
    ExtractionStage {
        id: StageId::Auth,
        name: "extract_auth",
        label: "Extract Auth Requirements",
        reads: &[StateField::ApiSpec, StateField::BusinessLogic],
        writes: StateField::AuthSpec,
        template: AUTH_TEMPLATE,
    },
    ExtractionStage {
        id: StageId::DbSchema,
        name: "extract_db_schema",
        label: "Extract DB Schema",
        reads: &[
            StateField::DocumentText,
            StateField::ApiSpec,
            StateField::BusinessLogic,
        ],
        writes: StateField::DbSchema,
        template: DB_SCHEMA_TEMPLATE,
    },
    ExtractionStage {
        id: StageId::ProjectPlan,
        name: "project_setup",
        label: "Project Setup",
        reads: &[
            StateField::ApiSpec,
            StateField::BusinessLogic,
            StateField::AuthSpec,
            StateField::DbSchema,
        ],
        writes: StateField::ProjectPlan,
        template: PROJECT_PLAN_TEMPLATE,
    },
];

/// Drives the stage machine against a completion collaborator.
pub struct Pipeline<C> {
    client: C,
}

impl<C: Completion> Pipeline<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Runs every stage from [`StageId::INITIAL`] to the terminal stage.
    pub fn run(&self, document_text: impl Into<String>) -> Result<PipelineState, PipelineError> {
        let mut state = PipelineState::new(document_text);
        let mut current = Some(StageId::INITIAL);

        while let Some(id) = current {
            state = self.execute_stage(id.descriptor(), state)?;
            current = id.next();
        }

        Ok(state)
    }

    /// Runs one stage and returns the extended state.
    pub fn execute_stage(
        &self,
        stage: &ExtractionStage,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let prompt = stage
            .build_prompt(&state)
            .map_err(|source| PipelineError::Prompt {
                stage: stage.name,
                source,
            })?;

        tracing::info!(stage = stage.name, model = self.client.model_name(), "running extraction stage");
        let response = self
            .client
            .complete(&prompt)
            .map_err(|source| PipelineError::Transport {
                stage: stage.name,
                source,
            })?;

        let payload = recover(&response);
        if payload.is_parsed() {
            tracing::debug!(stage = stage.name, "stage payload recovered");
        } else {
            tracing::warn!(
                stage = stage.name,
                "stage output is not structured; keeping raw text and continuing"
            );
        }

        state
            .extend(stage.writes, payload)
            .map_err(|source| PipelineError::State {
                stage: stage.name,
                source,
            })
    }
}

const API_TEMPLATE: &str = r#"From the following software requirements specification (SRS), extract every REST API endpoint with its HTTP method, path and parameters.
Extract only the API endpoints. Respond with JSON only and no other text, using this shape:
{ "endpoints": [ { "method": "GET", "path": "/items", "parameters": [] } ] }

SRS:
{{input.document_text}}
"#;

const LOGIC_TEMPLATE: &str = r#"From the following API definitions, extract the business rules and backend logic (computations, validations, workflows).
Do not answer from general knowledge. If no logic is present, respond with "No business logic found".
Extract only the business logic. Respond with JSON only and no other text.

API definitions:
{{input.api_spec}}
"#;

const AUTH_TEMPLATE: &str = r#"Extract the authentication and authorization methods implied by the following API definitions and business logic.
Extract only authentication and authorization requirements. Respond with JSON only and no other text.

API definitions:
{{input.api_spec}}

Business logic:
{{input.business_logic}}
"#;

const DB_SCHEMA_TEMPLATE: &str = r#"From the following SRS, extract the database schema: tables, columns and relationships.
Do not answer from general knowledge. If no database schema is present, respond with "No database schema found".
Respond with JSON only and no other text, using this shape:
{ "tables": [ { "name": "users", "columns": [ { "name": "id", "type": "integer" }, { "name": "team_id", "type": "integer", "foreign_key": "teams(id)" } ] } ] }

SRS:
{{input.document_text}}

API definitions:
{{input.api_spec}}

Business logic:
{{input.business_logic}}
"#;

const PROJECT_PLAN_TEMPLATE: &str = r#"Based on the following project analysis, generate the complete initial FastAPI project structure as JSON.
Respond with JSON only and no other text.

Rules:
- Keys ending with "/" are folders and map to objects of their contents.
- Any other key is a file name and maps to the full file content as a string.
- Include a "requirements.txt" file listing every dependency.
- Include a "setup.sh" script that sets up the environment.
- Do not create database tables that already exist.

Example:
{
  "app/": {
    "routers/": { "user.py": "content of user.py", "item.py": "content of item.py" },
    "models/": { "user.py": "content of user.py", "item.py": "content of item.py" },
    "__init__.py": "",
    "main.py": "content of main.py"
  },
  "tests/": { "test_main.py": "content of test_main.py" },
  "requirements.txt": "fastapi\nuvicorn\nsqlalchemy\npsycopg2-binary\npython-dotenv",
  "setup.sh": "content of setup.sh",
  "README.md": "content of README.md"
}

API definitions:
{{input.api_spec}}

Business logic:
{{input.business_logic}}

Authentication and authorization:
{{input.auth_spec}}

Database schema:
{{input.db_schema}}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StructuredPayload;
    use std::sync::Mutex;

    /// Replies with a marker naming the stage it believes it is serving.
    struct MarkerCompletion {
        prompts: Mutex<Vec<String>>,
    }

    impl MarkerCompletion {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Completion for MarkerCompletion {
        fn model_name(&self) -> &str {
            "marker"
        }

        fn complete(&self, prompt: &str) -> Result<String, TransportError> {
            let mut prompts = self.prompts.lock().unwrap();
            let n = prompts.len();
            prompts.push(prompt.to_string());
            Ok(format!("{{\"marker\": \"OUTPUT_OF_STAGE_{n}\"}}"))
        }
    }

    struct FailingCompletion;

    impl Completion for FailingCompletion {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn complete(&self, _prompt: &str) -> Result<String, TransportError> {
            Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_stage_order_is_linear() {
        let mut order = Vec::new();
        let mut current = Some(StageId::INITIAL);
        while let Some(id) = current {
            order.push(id.descriptor().name);
            current = id.next();
        }
        assert_eq!(
            order,
            vec![
                "extract_api",
                "extract_logic",
                "extract_auth",
                "extract_db_schema",
                "project_setup"
            ]
        );
    }

    #[test]
    fn test_descriptors_match_ids() {
        for stage in &STAGES {
            assert_eq!(stage.id.descriptor().name, stage.name);
        }
    }

    #[test]
    fn test_every_read_is_written_by_an_earlier_stage() {
        let mut available = vec![StateField::DocumentText];
        for stage in &STAGES {
            for read in stage.reads {
                assert!(
                    available.contains(read),
                    "{} reads {} before it is written",
                    stage.name,
                    read
                );
            }
            available.push(stage.writes);
        }
    }

    #[test]
    fn test_input_view_contains_declared_fields_only() {
        let state = PipelineState::new("doc")
            .extend(StateField::ApiSpec, StructuredPayload::Unparsed("api".into()))
            .unwrap()
            .extend(
                StateField::BusinessLogic,
                StructuredPayload::Unparsed("logic".into()),
            )
            .unwrap();

        let view = StageId::Logic.descriptor().input_view(&state);
        let keys: Vec<&String> = view.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["api_spec"]);
    }

    #[test]
    fn test_no_stage_observes_later_outputs() {
        let client = MarkerCompletion::new();
        let pipeline = Pipeline::new(&client);
        let state = pipeline.run("The system exposes GET /items.").unwrap();

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), STAGES.len());
        for (k, prompt) in prompts.iter().enumerate() {
            for j in k..STAGES.len() {
                assert!(
                    !prompt.contains(&format!("OUTPUT_OF_STAGE_{j}")),
                    "stage {k} saw output of stage {j}"
                );
            }
        }
        assert!(state.project_plan().unwrap().is_parsed());
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let state = PipelineState::new("doc");
        let stage = StageId::Api.descriptor();
        assert_eq!(
            stage.build_prompt(&state).unwrap(),
            stage.build_prompt(&state).unwrap()
        );
        assert!(stage.build_prompt(&state).unwrap().contains("SRS:\ndoc"));
    }

    #[test]
    fn test_stage_run_out_of_order_fails_on_missing_input() {
        let pipeline = Pipeline::new(MarkerCompletion::new());
        let err = pipeline
            .execute_stage(StageId::Auth.descriptor(), PipelineState::new("doc"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Prompt {
                stage: "extract_auth",
                source: PopulateError::MissingMandatoryPlaceholder(_)
            }
        ));
    }

    #[test]
    fn test_transport_error_aborts_run() {
        let pipeline = Pipeline::new(FailingCompletion);
        let err = pipeline.run("doc").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transport {
                stage: "extract_api",
                ..
            }
        ));
    }
}
