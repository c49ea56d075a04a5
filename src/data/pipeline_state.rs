use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::StructuredPayload;

/// One slot of the pipeline state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    DocumentText,
    ApiSpec,
    BusinessLogic,
    AuthSpec,
    DbSchema,
    ProjectPlan,
}

impl StateField {
    pub const ALL: [StateField; 6] = [
        StateField::DocumentText,
        StateField::ApiSpec,
        StateField::BusinessLogic,
        StateField::AuthSpec,
        StateField::DbSchema,
        StateField::ProjectPlan,
    ];

    /// Key used for this field in prompt templates.
    pub const fn key(self) -> &'static str {
        match self {
            StateField::DocumentText => "document_text",
            StateField::ApiSpec => "api_spec",
            StateField::BusinessLogic => "business_logic",
            StateField::AuthSpec => "auth_spec",
            StateField::DbSchema => "db_schema",
            StateField::ProjectPlan => "project_plan",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state field '{0}' is already populated")]
    AlreadyPopulated(StateField),
    #[error("state field '{0}' is the pipeline input and cannot be written by a stage")]
    InputField(StateField),
}

/// Accumulated output of a pipeline run.
///
/// Created from the input document and extended once per stage. Extension
/// consumes the previous record and never overwrites a populated field.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    document_text: String,
    api_spec: Option<StructuredPayload>,
    business_logic: Option<StructuredPayload>,
    auth_spec: Option<StructuredPayload>,
    db_schema: Option<StructuredPayload>,
    project_plan: Option<StructuredPayload>,
}

impl PipelineState {
    pub fn new(document_text: impl Into<String>) -> Self {
        Self {
            document_text: document_text.into(),
            api_spec: None,
            business_logic: None,
            auth_spec: None,
            db_schema: None,
            project_plan: None,
        }
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    pub fn api_spec(&self) -> Option<&StructuredPayload> {
        self.api_spec.as_ref()
    }

    pub fn business_logic(&self) -> Option<&StructuredPayload> {
        self.business_logic.as_ref()
    }

    pub fn auth_spec(&self) -> Option<&StructuredPayload> {
        self.auth_spec.as_ref()
    }

    pub fn db_schema(&self) -> Option<&StructuredPayload> {
        self.db_schema.as_ref()
    }

    pub fn project_plan(&self) -> Option<&StructuredPayload> {
        self.project_plan.as_ref()
    }

    pub fn payload(&self, field: StateField) -> Option<&StructuredPayload> {
        match field {
            StateField::DocumentText => None,
            StateField::ApiSpec => self.api_spec(),
            StateField::BusinessLogic => self.business_logic(),
            StateField::AuthSpec => self.auth_spec(),
            StateField::DbSchema => self.db_schema(),
            StateField::ProjectPlan => self.project_plan(),
        }
    }

    /// Text of a field as it should appear in a prompt.
    pub fn field_text(&self, field: StateField) -> Option<&str> {
        match field {
            StateField::DocumentText => Some(&self.document_text),
            other => self.payload(other).map(StructuredPayload::as_text),
        }
    }

    pub fn is_populated(&self, field: StateField) -> bool {
        self.field_text(field).is_some()
    }

    pub fn populated_fields(&self) -> Vec<StateField> {
        StateField::ALL
            .into_iter()
            .filter(|field| self.is_populated(*field))
            .collect()
    }

    /// Returns a new state equal to `self` plus `field`.
    pub fn extend(
        mut self,
        field: StateField,
        payload: StructuredPayload,
    ) -> Result<Self, StateError> {
        let slot = match field {
            StateField::DocumentText => return Err(StateError::InputField(field)),
            StateField::ApiSpec => &mut self.api_spec,
            StateField::BusinessLogic => &mut self.business_logic,
            StateField::AuthSpec => &mut self.auth_spec,
            StateField::DbSchema => &mut self.db_schema,
            StateField::ProjectPlan => &mut self.project_plan,
        };
        if slot.is_some() {
            return Err(StateError::AlreadyPopulated(field));
        }
        *slot = Some(payload);
        Ok(self)
    }
}
