//! Runtime configuration: built-in defaults, overlaid by an optional YAML
//! file, overlaid by environment variables.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::{DEFAULT_MODEL, GROQ_API_BASE, GroqConfig};

/// Loaded from the working directory when no file is given explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "specforge.yml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Where generated projects are materialized.
    pub output_dir: PathBuf,
    /// Where documentation is written and served from.
    pub docs_dir: PathBuf,
    pub max_refine_iterations: usize,
    pub refine_jobs: usize,
    /// Response cache location; caching is off when unset.
    pub cache_dir: Option<PathBuf>,
    pub listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: GROQ_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            request_timeout_secs: 120,
            output_dir: PathBuf::from("generated_project"),
            docs_dir: PathBuf::from("docs"),
            max_refine_iterations: 3,
            refine_jobs: 4,
            cache_dir: None,
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Settings {
    /// Reads `config_file` (or [`DEFAULT_CONFIG_FILE`] when present) and
    /// applies the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, SettingsError> {
        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        let file = match config_file {
            Some(path) => Some(path),
            None if default_file.is_file() => Some(default_file),
            None => None,
        };

        let settings = match file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        settings.with_env(|name| std::env::var(name).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Overlays variables resolved through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("GROQ_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = get("SPECFORGE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("SPECFORGE_MODEL") {
            self.model = model;
        }
        if let Some(value) = get("SPECFORGE_TEMPERATURE") {
            self.temperature = parse_var("SPECFORGE_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("SPECFORGE_MAX_TOKENS") {
            self.max_tokens = parse_var("SPECFORGE_MAX_TOKENS", &value)?;
        }
        if let Some(value) = get("SPECFORGE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("SPECFORGE_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(dir) = get("SPECFORGE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("SPECFORGE_DOCS_DIR") {
            self.docs_dir = PathBuf::from(dir);
        }
        if let Some(value) = get("SPECFORGE_MAX_REFINE_ITERATIONS") {
            self.max_refine_iterations = parse_var("SPECFORGE_MAX_REFINE_ITERATIONS", &value)?;
        }
        if let Some(value) = get("SPECFORGE_REFINE_JOBS") {
            self.refine_jobs = parse_var("SPECFORGE_REFINE_JOBS", &value)?;
        }
        if let Some(dir) = get("SPECFORGE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(addr) = get("SPECFORGE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn groq_config(&self) -> GroqConfig {
        GroqConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.request_timeout(),
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue {
            var,
            value: value.to_string(),
        })
}
