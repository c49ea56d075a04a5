use std::path::{Path, PathBuf};
use std::process::Command;

use crate::data::StepOutcome;

/// Prepares a runtime environment for a generated project.
pub trait EnvironmentSetup: Send + Sync {
    fn setup(&self, project_dir: &Path) -> StepOutcome;
}

/// Creates a Python virtual environment and installs `requirements.txt`.
#[derive(Debug, Clone)]
pub struct VenvSetup {
    python: String,
    venv_dir: String,
}

impl Default for VenvSetup {
    fn default() -> Self {
        let python = if cfg!(windows) { "python" } else { "python3" };
        Self::new(python)
    }
}

impl VenvSetup {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            venv_dir: "venv".to_string(),
        }
    }

    fn pip_path(&self, project_dir: &Path) -> PathBuf {
        let venv = project_dir.join(&self.venv_dir);
        if cfg!(windows) {
            venv.join("Scripts").join("pip.exe")
        } else {
            venv.join("bin").join("pip")
        }
    }
}

impl EnvironmentSetup for VenvSetup {
    fn setup(&self, project_dir: &Path) -> StepOutcome {
        // Commands run inside the project, so a relative pip path would be
        // resolved against it a second time.
        let project_dir = match std::path::absolute(project_dir) {
            Ok(dir) => dir,
            Err(e) => {
                return StepOutcome::failed(format!("Failed to create virtual environment: {}", e));
            }
        };
        let project_dir = project_dir.as_path();
        tracing::info!(dir = %project_dir.display(), "creating virtual environment");
        let created = run(
            Command::new(&self.python)
                .args(["-m", "venv", self.venv_dir.as_str()])
                .current_dir(project_dir),
        );
        if let Err(e) = created {
            return StepOutcome::failed(format!("Failed to create virtual environment: {}", e));
        }

        if !project_dir.join("requirements.txt").is_file() {
            return StepOutcome::ok("Virtual environment created (no requirements.txt found)");
        }

        let installed = run(
            Command::new(self.pip_path(project_dir))
                .args(["install", "-r", "requirements.txt"])
                .current_dir(project_dir),
        );
        match installed {
            Ok(()) => StepOutcome::ok("Virtual environment created and requirements installed"),
            Err(e) => StepOutcome::failed(format!("Failed to install requirements: {}", e)),
        }
    }
}

fn run(command: &mut Command) -> Result<(), String> {
    let output = command.output().map_err(|e| e.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{} ({})", stderr.trim(), output.status))
    }
}
