use crate::data::Cache;
use std::fs;
use std::path::PathBuf;

/// Default root folder for cached model responses.
pub const DEFAULT_CACHE_FOLDER: &str = ".specforge";

/// FileCache is an implementation of the Cache trait that stores model
/// responses on disk.
///
/// The cache is organized as: `{folder}/{model_hash}/{key}.cache`
/// where model_hash = hash(model_name), so switching models never serves
/// another model's answers.
#[derive(Debug, Clone)]
pub struct FileCache {
    folder: PathBuf,
    model_hash: String,
}

impl FileCache {
    /// `folder` defaults to [`DEFAULT_CACHE_FOLDER`].
    pub fn new(folder: Option<PathBuf>, model_hash: String) -> Self {
        Self {
            folder: folder.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FOLDER)),
            model_hash,
        }
    }

    /// Keys are hex digests and therefore safe as file names.
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir().join(format!("{}.cache", key))
    }

    fn cache_dir(&self) -> PathBuf {
        self.folder.join(&self.model_hash)
    }
}

impl Cache for FileCache {
    /// Missing or unreadable entries are cache misses.
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.cache_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        let dir = self.cache_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create cache directory");
            return;
        }

        let path = self.cache_path(key);
        if let Err(e) = fs::write(&path, value) {
            tracing::warn!(file = %path.display(), error = %e, "failed to write cache file");
        }
    }
}
