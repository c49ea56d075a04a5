mod cache;
mod completion;
mod db_schema;
mod outcome;
mod payload;
mod pipeline_state;
mod project_plan;
mod validation;

pub use cache::Cache;
pub use completion::{Completion, TransportError};
pub use db_schema::{ColumnDef, ColumnSpec, DbSchema, SchemaError, TableDef};
pub use outcome::StepOutcome;
pub use payload::StructuredPayload;
pub use pipeline_state::{PipelineState, StateError, StateField};
pub use project_plan::{DirNode, FileNode, PlanError, PlanNode, ProjectPlan};
pub use validation::{
    ErrorKind, FileFailure, FileStatus, RefinementAttempt, RefinementOutcome, RefinementStats,
    ValidationResult,
};
