/// Key-value store for model responses, keyed by prompt digest.
///
/// Storage failures never reach the caller: a cache that cannot be read
/// behaves like an empty one, and a failed write is logged and dropped.
pub trait Cache: Send + Sync {
    /// Returns the stored response for `key`, or `None` on a miss.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: &str);
}
