use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::setup_script;
use crate::data::{PlanNode, ProjectPlan};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write file {}: {source}", path.display())]
    WriteFile { path: PathBuf, source: io::Error },
    #[error("failed to update permissions of {}: {source}", path.display())]
    Permissions { path: PathBuf, source: io::Error },
}

/// What a materialization wrote, with paths relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub root: PathBuf,
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub executables: Vec<PathBuf>,
    pub generated_scripts: Vec<PathBuf>,
}

/// Writes `plan` under `root`.
///
/// Directories are created idempotently, files overwrite whatever is at
/// their path, and siblings are visited in plan order. Setup scripts are
/// made executable on Unix; elsewhere a `.bat` translation is written next
/// to them unless one already exists.
pub fn materialize(plan: &ProjectPlan, root: &Path) -> Result<MaterializeReport, MaterializeError> {
    create_dir(root)?;

    let mut report = MaterializeReport {
        root: root.to_path_buf(),
        ..Default::default()
    };
    write_nodes(plan.entries(), root, Path::new(""), &mut report)?;
    finalize_setup_scripts(root, &mut report)?;

    tracing::info!(
        root = %root.display(),
        directories = report.directories.len(),
        files = report.files.len(),
        "project tree materialized"
    );
    Ok(report)
}

fn write_nodes(
    nodes: &[PlanNode],
    root: &Path,
    relative: &Path,
    report: &mut MaterializeReport,
) -> Result<(), MaterializeError> {
    for node in nodes {
        match node {
            PlanNode::Dir(dir) => {
                let rel = relative.join(&dir.name);
                create_dir(&root.join(&rel))?;
                report.directories.push(rel.clone());
                write_nodes(&dir.children, root, &rel, report)?;
            }
            PlanNode::File(file) => {
                let rel = relative.join(&file.name);
                let path = root.join(&rel);
                if let Some(parent) = path.parent() {
                    create_dir(parent)?;
                }
                fs::write(&path, platform_content(&path, &file.content).as_bytes()).map_err(
                    |source| MaterializeError::WriteFile {
                        path: path.clone(),
                        source,
                    },
                )?;
                tracing::debug!(file = %rel.display(), "wrote file");
                report.files.push(rel);
            }
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), MaterializeError> {
    fs::create_dir_all(path).map_err(|source| MaterializeError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn finalize_setup_scripts(root: &Path, report: &mut MaterializeReport) -> Result<(), MaterializeError> {
    let scripts: Vec<PathBuf> = report
        .files
        .iter()
        .filter(|rel| {
            rel.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(setup_script::is_setup_script)
        })
        .cloned()
        .collect();

    for rel in scripts {
        finalize_setup_script(root, &rel, report)?;
    }
    Ok(())
}

#[cfg(unix)]
fn finalize_setup_script(
    root: &Path,
    rel: &Path,
    report: &mut MaterializeReport,
) -> Result<(), MaterializeError> {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(rel);
    let permissions_error = |source| MaterializeError::Permissions {
        path: path.clone(),
        source,
    };
    let mut perms = fs::metadata(&path).map_err(permissions_error)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(&path, perms).map_err(permissions_error)?;

    report.executables.push(rel.to_path_buf());
    Ok(())
}

#[cfg(not(unix))]
fn finalize_setup_script(
    root: &Path,
    rel: &Path,
    report: &mut MaterializeReport,
) -> Result<(), MaterializeError> {
    let path = root.join(rel);
    let batch_rel = rel.with_extension("bat");
    let batch_path = root.join(&batch_rel);
    if batch_path.exists() {
        return Ok(());
    }

    // Translation is advisory; a failure here does not fail the tree.
    let script = match fs::read_to_string(&path) {
        Ok(script) => script,
        Err(e) => {
            tracing::warn!(script = %path.display(), error = %e, "could not read setup script");
            return Ok(());
        }
    };
    let source_name = rel
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match fs::write(&batch_path, setup_script::translate_to_batch(&script, &source_name)) {
        Ok(()) => report.generated_scripts.push(batch_rel),
        Err(e) => {
            tracing::warn!(script = %batch_path.display(), error = %e, "could not write batch script")
        }
    }
    Ok(())
}

/// Python sources get CRLF line endings on Windows.
fn platform_content<'a>(path: &Path, content: &'a str) -> Cow<'a, str> {
    if cfg!(windows) && path.extension().and_then(|e| e.to_str()) == Some("py") {
        Cow::Owned(content.replace("\r\n", "\n").replace('\n', "\r\n"))
    } else {
        Cow::Borrowed(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn plan(value: serde_json::Value) -> ProjectPlan {
        ProjectPlan::from_value(&value).unwrap()
    }

    /// relative path -> file content (None for directories)
    fn snapshot(root: &Path) -> BTreeMap<String, Option<String>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Option<String>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                if path.is_dir() {
                    out.insert(rel, None);
                    walk(root, &path, out);
                } else {
                    out.insert(rel, Some(fs::read_to_string(&path).unwrap()));
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    #[test]
    fn test_directory_and_file_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        let report = materialize(
            &plan(json!({"app/": {"main.py": "x"}, "README.md": "y"})),
            &root,
        )
        .unwrap();

        assert!(root.join("app").is_dir());
        assert_eq!(fs::read_to_string(root.join("app/main.py")).unwrap(), "x");
        assert_eq!(fs::read_to_string(root.join("README.md")).unwrap(), "y");
        assert_eq!(report.directories, vec![PathBuf::from("app")]);
        assert_eq!(
            report.files,
            vec![PathBuf::from("app/main.py"), PathBuf::from("README.md")]
        );
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let p = plan(json!({
            "app/": {"routers/": {"items.py": "print('items')"}, "__init__.py": ""},
            "requirements.txt": "fastapi\nuvicorn"
        }));
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        materialize(&p, first.path()).unwrap();
        materialize(&p, second.path()).unwrap();
        assert_eq!(snapshot(first.path()), snapshot(second.path()));

        // Re-running over an existing tree is not an error.
        materialize(&p, first.path()).unwrap();
        assert_eq!(snapshot(first.path()), snapshot(second.path()));
    }

    #[test]
    fn test_existing_files_are_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README.md"), "old").unwrap();
        materialize(&plan(json!({"README.md": "new"})), tmp.path()).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("README.md")).unwrap(), "new");
    }

    #[test]
    fn test_file_parents_created_on_demand() {
        let tmp = tempfile::tempdir().unwrap();
        materialize(&plan(json!({"app/models/user.py": "class User: pass"})), tmp.path())
            .unwrap();
        assert!(tmp.path().join("app/models/user.py").is_file());
    }

    #[test]
    fn test_root_creation_failure_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "file in the way").unwrap();
        let err = materialize(&plan(json!({"a.txt": "x"})), &blocker.join("root")).unwrap_err();
        assert!(matches!(err, MaterializeError::CreateDir { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_setup_script_is_made_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let report = materialize(
            &plan(json!({"setup.sh": "#!/bin/bash\npip install -r requirements.txt\n"})),
            tmp.path(),
        )
        .unwrap();

        let mode = fs::metadata(tmp.path().join("setup.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
        assert_eq!(report.executables, vec![PathBuf::from("setup.sh")]);
        assert!(report.generated_scripts.is_empty());
    }
}
