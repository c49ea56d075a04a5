use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    UnresolvedImport,
    None,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::SyntaxError => f.write_str("Syntax error"),
            ErrorKind::UnresolvedImport => f.write_str("Import error"),
            ErrorKind::None => f.write_str("No error"),
        }
    }
}

/// Structural check outcome for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_kind: ErrorKind,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error_kind: ErrorKind::None,
            message: None,
        }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_kind: ErrorKind::SyntaxError,
            message: Some(message.into()),
        }
    }

    pub fn unresolved_import(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_kind: ErrorKind::UnresolvedImport,
            message: Some(message.into()),
        }
    }

    /// Human readable error, e.g. `Import error: Missing imports: foo`.
    pub fn describe(&self) -> Option<String> {
        self.message
            .as_ref()
            .map(|message| format!("{}: {}", self.error_kind, message))
    }
}

/// One repair request made by the refiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementAttempt {
    pub attempt_number: usize,
    pub prior_error: String,
    pub produced_code: String,
}

/// Final result of refining a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementOutcome {
    pub final_code: String,
    pub accepted: bool,
    pub iterations: usize,
    pub last_error: Option<String>,
    pub attempts: Vec<RefinementAttempt>,
}

/// Per-file classification produced by the project driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Valid,
    Fixed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Aggregate statistics of a whole-project refinement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefinementStats {
    pub total_files: usize,
    pub valid_files: usize,
    pub fixed_files: usize,
    pub failed_files: usize,
    pub iterations: usize,
    pub errors: Vec<FileFailure>,
}

impl RefinementStats {
    pub fn record(&mut self, file: &str, status: FileStatus, iterations: usize, error: Option<String>) {
        self.total_files += 1;
        self.iterations += iterations;
        match status {
            FileStatus::Valid => self.valid_files += 1,
            FileStatus::Fixed => self.fixed_files += 1,
            FileStatus::Failed => {
                self.failed_files += 1;
                self.errors.push(FileFailure {
                    file: file.to_string(),
                    error: error.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
    }
}
