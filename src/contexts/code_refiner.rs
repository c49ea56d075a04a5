//! Iterative check-and-repair loop for generated Python files.
//!
//! Each iteration runs the structural checks; a failure asks a [`CodeFixer`]
//! for a corrected version and the loop checks again, up to a fixed bound.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use thiserror::Error;

use super::prompt_template::{self, PopulateError};
use super::python_validator;
use super::structured_extractor::extract_code_block;
use crate::data::{
    Completion, ErrorKind, FileStatus, RefinementAttempt, RefinementOutcome, RefinementStats,
    TransportError, ValidationResult,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Directories never descended into when collecting sources.
const SKIPPED_DIRS: [&str; 4] = ["venv", ".venv", "__pycache__", "node_modules"];

/// Project layout listings sent to the fixer are capped at this many entries.
const MAX_LAYOUT_ENTRIES: usize = 200;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("fix request for {} failed: {source}", file.display())]
    Fix {
        file: PathBuf,
        source: TransportError,
    },
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// What the fixer is told about the file beyond its code and error.
#[derive(Debug, Clone)]
pub struct FixContext<'a> {
    pub file: &'a Path,
    pub error_kind: ErrorKind,
    /// Listing of the project tree, supplied for unresolved imports.
    pub project_layout: Option<String>,
}

/// Produces a corrected version of a source file.
pub trait CodeFixer: Send + Sync {
    fn suggest_fix(
        &self,
        code: &str,
        error: &str,
        context: &FixContext<'_>,
    ) -> Result<String, TransportError>;
}

/// A fixer backed by a completion model.
pub struct ModelCodeFixer<C> {
    client: C,
}

impl<C: Completion> ModelCodeFixer<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn build_prompt(&self, code: &str, error: &str, context: &FixContext<'_>) -> Result<String, PopulateError> {
        let template = match context.error_kind {
            ErrorKind::UnresolvedImport => IMPORT_FIX_TEMPLATE,
            _ => SYNTAX_FIX_TEMPLATE,
        };
        let input = json!({
            "file": context.file.to_string_lossy(),
            "error": error,
            "code": code,
            "project_layout": context.project_layout,
        });
        prompt_template::populate(template, &input)
    }
}

impl<C: Completion> CodeFixer for ModelCodeFixer<C> {
    fn suggest_fix(
        &self,
        code: &str,
        error: &str,
        context: &FixContext<'_>,
    ) -> Result<String, TransportError> {
        let prompt = self
            .build_prompt(code, error, context)
            .map_err(|e| TransportError::Request(format!("fix prompt could not be built: {}", e)))?;
        let response = self.client.complete(&prompt)?;
        let fixed = extract_code_block(&response, &["python", "py"]).unwrap_or_else(|| response.trim());
        Ok(fixed.to_string())
    }
}

const SYNTAX_FIX_TEMPLATE: &str = r#"The following Python file has a syntax error. Fix it without changing its behaviour.
Return only the complete corrected file in a single ```python code block.

File: {{input.file}}
Error: {{input.error}}

```python
{{input.code}}
```
"#;

const IMPORT_FIX_TEMPLATE: &str = r#"The following Python file imports modules that cannot be resolved in its project.
Fix the imports so every module is either part of the standard library, declared in requirements.txt, or present in the project layout below.
Return only the complete corrected file in a single ```python code block.

File: {{input.file}}
Error: {{input.error}}

Project layout:
{{input.project_layout?}}

```python
{{input.code}}
```
"#;

/// States of the per-file repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineState {
    Checking,
    Repairing(ValidationResult),
    Accepted,
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct CodeRefiner {
    max_iterations: usize,
}

impl Default for CodeRefiner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl CodeRefiner {
    /// A bound of zero is raised to one so every file is checked at least once.
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Refines one file. `file` is relative to `project_root` or absolute.
    ///
    /// Once the checks pass no further fix is requested. When the bound is
    /// reached the last fixer output is returned unaccepted along with the
    /// error that prompted it.
    pub fn refine(
        &self,
        code: &str,
        file: &Path,
        project_root: &Path,
        fixer: &dyn CodeFixer,
    ) -> Result<RefinementOutcome, RefineError> {
        let mut current = code.to_string();
        let mut attempts = Vec::new();
        let mut last_error = None;
        let mut iterations = 0;
        let mut state = RefineState::Checking;

        loop {
            state = match state {
                RefineState::Checking if iterations == self.max_iterations => RefineState::Exhausted,
                RefineState::Checking => {
                    iterations += 1;
                    let result = python_validator::validate(&current, file, project_root);
                    tracing::debug!(
                        file = %file.display(),
                        iteration = iterations,
                        valid = result.is_valid,
                        "checked file"
                    );
                    if result.is_valid {
                        RefineState::Accepted
                    } else {
                        RefineState::Repairing(result)
                    }
                }
                RefineState::Repairing(result) => {
                    let error = result.describe().unwrap_or_else(|| result.error_kind.to_string());
                    let context = FixContext {
                        file,
                        error_kind: result.error_kind,
                        project_layout: (result.error_kind == ErrorKind::UnresolvedImport)
                            .then(|| project_layout(project_root)),
                    };
                    tracing::info!(file = %file.display(), iteration = iterations, error = %error, "requesting fix");
                    let fixed = fixer
                        .suggest_fix(&current, &error, &context)
                        .map_err(|source| RefineError::Fix {
                            file: file.to_path_buf(),
                            source,
                        })?;
                    attempts.push(RefinementAttempt {
                        attempt_number: iterations,
                        prior_error: error.clone(),
                        produced_code: fixed.clone(),
                    });
                    last_error = Some(error);
                    current = fixed;
                    RefineState::Checking
                }
                RefineState::Accepted => {
                    return Ok(RefinementOutcome {
                        final_code: current,
                        accepted: true,
                        iterations,
                        last_error: None,
                        attempts,
                    });
                }
                RefineState::Exhausted => {
                    tracing::warn!(file = %file.display(), iterations, "refinement bound reached");
                    return Ok(RefinementOutcome {
                        final_code: current,
                        accepted: false,
                        iterations,
                        last_error,
                        attempts,
                    });
                }
            };
        }
    }

    /// Refines every Python file under `project_root` with up to `jobs`
    /// worker threads. Fixed code is written back; failures are collected
    /// sorted by file.
    pub fn refine_project(
        &self,
        project_root: &Path,
        fixer: &dyn CodeFixer,
        jobs: usize,
    ) -> Result<RefinementStats, RefineError> {
        let files = python_files(project_root)?;
        let workers = jobs.clamp(1, files.len().max(1));
        tracing::info!(root = %project_root.display(), files = files.len(), workers, "refining project");

        let next = AtomicUsize::new(0);
        let stats = Mutex::new(RefinementStats::default());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(rel) = files.get(index) else {
                            break;
                        };
                        let (status, iterations, error) = self.refine_file(project_root, rel, fixer);
                        let name = rel.to_string_lossy().replace('\\', "/");
                        stats
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .record(&name, status, iterations, error);
                    }
                });
            }
        });

        let mut stats = stats.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.errors.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(stats)
    }

    fn refine_file(
        &self,
        project_root: &Path,
        rel: &Path,
        fixer: &dyn CodeFixer,
    ) -> (FileStatus, usize, Option<String>) {
        let path = project_root.join(rel);
        let code = match fs::read_to_string(&path) {
            Ok(code) => code,
            Err(e) => return (FileStatus::Failed, 0, Some(format!("could not read file: {}", e))),
        };

        let outcome = match self.refine(&code, rel, project_root, fixer) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(file = %rel.display(), error = %e, "refinement aborted");
                return (FileStatus::Failed, 0, Some(e.to_string()));
            }
        };

        if !outcome.accepted {
            return (FileStatus::Failed, outcome.iterations, outcome.last_error);
        }
        // A file that passed its first check took no repair iterations.
        if outcome.attempts.is_empty() {
            return (FileStatus::Valid, 0, None);
        }
        match fs::write(&path, &outcome.final_code) {
            Ok(()) => (FileStatus::Fixed, outcome.iterations, None),
            Err(e) => (
                FileStatus::Failed,
                outcome.iterations,
                Some(format!("could not write fixed file: {}", e)),
            ),
        }
    }
}

fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Relative paths of every `.py` file under `root`, sorted.
pub fn python_files(root: &Path) -> Result<Vec<PathBuf>, RefineError> {
    let mut files = Vec::new();
    walk(root, root, &mut |rel: &Path, is_dir: bool| {
        if !is_dir && rel.extension().is_some_and(|ext| ext == "py") {
            files.push(rel.to_path_buf());
        }
    })?;
    files.sort();
    Ok(files)
}

/// Sorted listing of the project tree with `/` marking directories.
pub fn project_layout(root: &Path) -> String {
    let mut entries = Vec::new();
    let walked = walk(root, root, &mut |rel: &Path, is_dir: bool| {
        let mut entry = rel.to_string_lossy().replace('\\', "/");
        if is_dir {
            entry.push('/');
        }
        entries.push(entry);
    });
    if let Err(e) = walked {
        tracing::debug!(error = %e, "project layout is incomplete");
    }
    entries.sort();
    entries.truncate(MAX_LAYOUT_ENTRIES);
    entries.join("\n")
}

fn walk(root: &Path, dir: &Path, visit: &mut dyn FnMut(&Path, bool)) -> Result<(), RefineError> {
    let io_error = |source| RefineError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let is_dir = entry.file_type().map_err(io_error)?.is_dir();
        if is_dir {
            let name = entry.file_name();
            if is_skipped_dir(&name.to_string_lossy()) {
                continue;
            }
            visit(rel, true);
            walk(root, &path, visit)?;
        } else {
            visit(rel, false);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedCompletion;
    use std::collections::VecDeque;

    /// Returns queued fixes in order and records every request.
    struct ScriptedFixer {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl ScriptedFixer {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl CodeFixer for ScriptedFixer {
        fn suggest_fix(
            &self,
            code: &str,
            error: &str,
            context: &FixContext<'_>,
        ) -> Result<String, TransportError> {
            self.requests.lock().unwrap().push((
                code.to_string(),
                error.to_string(),
                context.project_layout.clone(),
            ));
            let reply = self.replies.lock().unwrap().pop_front();
            Ok(reply.unwrap_or_else(|| code.to_string()))
        }
    }

    struct UnreachableFixer;

    impl CodeFixer for UnreachableFixer {
        fn suggest_fix(&self, _: &str, _: &str, _: &FixContext<'_>) -> Result<String, TransportError> {
            Err(TransportError::Request("connection refused".to_string()))
        }
    }

    const BROKEN: &str = "def f(:\n    pass\n";
    const GOOD: &str = "def f():\n    pass\n";

    #[test]
    fn test_valid_code_needs_no_fix() {
        let tmp = tempfile::tempdir().unwrap();
        let fixer = ScriptedFixer::new(&[]);
        let outcome = CodeRefiner::default()
            .refine(GOOD, Path::new("main.py"), tmp.path(), &fixer)
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.attempts.is_empty());
        assert_eq!(fixer.request_count(), 0);
    }

    #[test]
    fn test_fixed_on_second_iteration_stops_requesting() {
        let tmp = tempfile::tempdir().unwrap();
        let fixer = ScriptedFixer::new(&[GOOD, "never used"]);
        let outcome = CodeRefiner::default()
            .refine(BROKEN, Path::new("main.py"), tmp.path(), &fixer)
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.final_code, GOOD);
        assert_eq!(outcome.last_error, None);
        assert_eq!(fixer.request_count(), 1);

        let (code, error, layout) = fixer.requests.lock().unwrap()[0].clone();
        assert_eq!(code, BROKEN);
        assert!(error.starts_with("Syntax error: "));
        assert_eq!(layout, None);
    }

    #[test]
    fn test_exhaustion_respects_bound() {
        let tmp = tempfile::tempdir().unwrap();
        for bound in 1..=4 {
            let fixer = ScriptedFixer::new(&[]);
            let outcome = CodeRefiner::new(bound)
                .refine(BROKEN, Path::new("main.py"), tmp.path(), &fixer)
                .unwrap();
            assert!(!outcome.accepted);
            assert_eq!(outcome.iterations, bound);
            assert_eq!(outcome.attempts.len(), bound);
            assert_eq!(fixer.request_count(), bound);
            assert!(outcome.last_error.unwrap().starts_with("Syntax error"));
        }
    }

    #[test]
    fn test_attempt_numbers_increase() {
        let tmp = tempfile::tempdir().unwrap();
        let fixer = ScriptedFixer::new(&[BROKEN, BROKEN, BROKEN]);
        let outcome = CodeRefiner::default()
            .refine(BROKEN, Path::new("main.py"), tmp.path(), &fixer)
            .unwrap();
        let numbers: Vec<usize> = outcome.attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_import_fix_receives_project_layout() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("app")).unwrap();
        fs::write(tmp.path().join("app/__init__.py"), "").unwrap();
        let fixer = ScriptedFixer::new(&["import app\n"]);

        let outcome = CodeRefiner::default()
            .refine("import missing_pkg\n", Path::new("main.py"), tmp.path(), &fixer)
            .unwrap();
        assert!(outcome.accepted);

        let (_, error, layout) = fixer.requests.lock().unwrap()[0].clone();
        assert_eq!(error, "Import error: Missing imports: missing_pkg");
        assert_eq!(layout.as_deref(), Some("app/\napp/__init__.py"));
    }

    #[test]
    fn test_transport_failure_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CodeRefiner::default()
            .refine(BROKEN, Path::new("main.py"), tmp.path(), &UnreachableFixer)
            .unwrap_err();
        assert!(matches!(err, RefineError::Fix { .. }));
    }

    #[test]
    fn test_python_files_skips_environments() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for dir in ["app", "venv/lib", ".git", "app/__pycache__"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in ["main.py", "app/models.py", "venv/lib/site.py", ".git/hook.py", "app/__pycache__/x.py", "README.md"] {
            fs::write(root.join(file), "").unwrap();
        }
        assert_eq!(
            python_files(root).unwrap(),
            vec![PathBuf::from("app/models.py"), PathBuf::from("main.py")]
        );
    }

    #[test]
    fn test_valid_project_counts_no_iterations() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.py"), GOOD).unwrap();
        fs::write(tmp.path().join("util.py"), GOOD).unwrap();

        let stats = CodeRefiner::default()
            .refine_project(tmp.path(), &UnreachableFixer, 2)
            .unwrap();
        assert_eq!(stats.valid_files, 2);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn test_refine_project_classifies_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("a_valid.py"), GOOD).unwrap();
        fs::write(root.join("b_fixable.py"), BROKEN).unwrap();
        fs::write(root.join("c_broken.py"), "import nowhere_to_be_found\n").unwrap();

        struct ByFile;
        impl CodeFixer for ByFile {
            fn suggest_fix(&self, code: &str, _: &str, context: &FixContext<'_>) -> Result<String, TransportError> {
                if context.file.ends_with("b_fixable.py") {
                    Ok(GOOD.to_string())
                } else {
                    Ok(code.to_string())
                }
            }
        }

        for jobs in [1, 3] {
            fs::write(root.join("b_fixable.py"), BROKEN).unwrap();
            let stats = CodeRefiner::default().refine_project(root, &ByFile, jobs).unwrap();
            assert_eq!(stats.total_files, 3);
            assert_eq!(stats.valid_files, 1);
            assert_eq!(stats.fixed_files, 1);
            assert_eq!(stats.failed_files, 1);
            assert_eq!(stats.iterations, 2 + 3);
            assert_eq!(stats.errors.len(), 1);
            assert_eq!(stats.errors[0].file, "c_broken.py");
            assert_eq!(fs::read_to_string(root.join("b_fixable.py")).unwrap(), GOOD);
            assert_eq!(
                fs::read_to_string(root.join("c_broken.py")).unwrap(),
                "import nowhere_to_be_found\n"
            );
        }
    }

    #[test]
    fn test_transport_failure_marks_file_failed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.py"), BROKEN).unwrap();
        let stats = CodeRefiner::default()
            .refine_project(tmp.path(), &UnreachableFixer, 2)
            .unwrap();
        assert_eq!(stats.failed_files, 1);
        assert!(stats.errors[0].error.contains("connection refused"));
        assert_eq!(fs::read_to_string(tmp.path().join("main.py")).unwrap(), BROKEN);
    }

    #[test]
    fn test_model_fixer_extracts_code_block() {
        let client = ScriptedCompletion::new(["Here you go:\n```python\nprint('ok')\n```\nDone."]);
        let fixer = ModelCodeFixer::new(&client);
        let context = FixContext {
            file: Path::new("app/main.py"),
            error_kind: ErrorKind::SyntaxError,
            project_layout: None,
        };
        let fixed = fixer.suggest_fix("print('ok'", "Syntax error: x", &context).unwrap();
        assert_eq!(fixed, "print('ok')");

        let prompts = client.prompts();
        assert!(prompts[0].contains("File: app/main.py"));
        assert!(prompts[0].contains("print('ok'\n```"));
    }

    #[test]
    fn test_model_fixer_falls_back_to_trimmed_response() {
        let client = ScriptedCompletion::new(["  x = 1\n  "]);
        let fixer = ModelCodeFixer::new(&client);
        let context = FixContext {
            file: Path::new("a.py"),
            error_kind: ErrorKind::UnresolvedImport,
            project_layout: Some("a.py".to_string()),
        };
        assert_eq!(fixer.suggest_fix("x=", "e", &context).unwrap(), "x = 1");
    }
}
