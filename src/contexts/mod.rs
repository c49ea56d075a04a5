mod analyzer;
mod code_refiner;
mod document_reader;
mod documentation;
mod environment;
mod file_cache;
mod materializer;
mod pipeline;
mod prompt_template;
mod python_validator;
mod schema_sink;
pub mod setup_script;
pub mod structured_extractor;

pub use analyzer::{
    AnalysisError, AnalysisReport, AnalysisResponse, Analyzer, AnalyzerOptions, ProjectGeneration,
    completion_from_settings,
};
pub use code_refiner::{
    CodeFixer, CodeRefiner, DEFAULT_MAX_ITERATIONS, FixContext, ModelCodeFixer, RefineError,
    RefineState, project_layout, python_files,
};
pub use document_reader::{DocumentError, read_document};
pub use documentation::{
    DOCS_MOUNT, DocsError, Documentation, DocumentationLinks, render_dot, render_mermaid,
};
pub use environment::{EnvironmentSetup, VenvSetup};
pub use file_cache::{DEFAULT_CACHE_FOLDER, FileCache};
pub use materializer::{MaterializeError, MaterializeReport, materialize};
pub use pipeline::{ExtractionStage, Pipeline, PipelineError, STAGES, StageId};
pub use prompt_template::{PopulateError, populate};
pub use python_validator::{
    ImportRef, check_imports, check_syntax, collect_imports, requirement_modules, validate,
};
pub use schema_sink::{DdlFileSink, SchemaSink, SinkError, render_ddl};
pub use structured_extractor::{FencedBlock, extract_code_block, recover};
