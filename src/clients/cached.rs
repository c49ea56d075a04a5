use sha2::{Digest, Sha256};

use crate::data::{Cache, Completion, TransportError};

/// Memoizes responses of an inner completion in a [`Cache`].
///
/// Entries are keyed by SHA-256 of the model name and prompt. Failed calls
/// are never cached.
pub struct CachedCompletion<C, K> {
    inner: C,
    cache: K,
}

impl<C: Completion, K: Cache> CachedCompletion<C, K> {
    pub fn new(inner: C, cache: K) -> Self {
        Self { inner, cache }
    }

    pub fn cache_key(model_name: &str, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_name.as_bytes());
        hasher.update(b"\n");
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Hash of the model name, used to partition on-disk caches per model.
pub fn model_hash(model_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hex::encode(hasher.finalize())
}

impl<C: Completion, K: Cache> Completion for CachedCompletion<C, K> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        let key = Self::cache_key(self.inner.model_name(), prompt);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "completion cache hit");
            return Ok(hit);
        }

        let response = self.inner.complete(prompt)?;
        self.cache.set(&key, &response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedCompletion;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCache(Mutex<HashMap<String, String>>);

    impl Cache for MemoryCache {
        fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
        }
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let inner = ScriptedCompletion::new(["first"]);
        let cached = CachedCompletion::new(&inner, MemoryCache::default());

        assert_eq!(cached.complete("prompt").unwrap(), "first");
        assert_eq!(cached.complete("prompt").unwrap(), "first");
        assert_eq!(inner.prompts().len(), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let inner = ScriptedCompletion::new(Vec::<String>::new());
        let cache = MemoryCache::default();
        let cached = CachedCompletion::new(&inner, cache);

        assert!(cached.complete("prompt").is_err());
        assert!(cached.cache.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_key_depends_on_model_and_prompt() {
        type Cached<'a> = CachedCompletion<&'a ScriptedCompletion, MemoryCache>;
        let a = Cached::cache_key("m1", "p");
        assert_eq!(a.len(), 64);
        assert_eq!(a, Cached::cache_key("m1", "p"));
        assert_ne!(a, Cached::cache_key("m2", "p"));
        assert_ne!(a, Cached::cache_key("m1", "q"));
    }
}
