//! Cache backend traits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheError;

/// Trait for cache operations.
///
/// All cache backends must implement this trait to provide a unified interface.
/// A miss is `Ok(None)`, never an error; expired entries are purged on read.
#[async_trait]
pub trait AppCache: Send + Sync {
    /// Short backend label used in logs.
    fn name(&self) -> &'static str;

    /// Get a value from the cache.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value in the cache, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    /// Remove a value from the cache. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Clear all values owned by this backend.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Bulk operations offered by backends with a native multi-key protocol.
#[async_trait]
pub trait BatchCache: AppCache {
    /// Read several keys at once. The result has one slot per input key, in order.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError>;

    /// Write several entries in a single atomic batch.
    async fn multi_set(
        &self,
        entries: &HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Collect every key whose name matches the glob `pattern`.
    async fn scan_keys(&self, pattern: &str, batch_size: usize) -> Result<Vec<String>, CacheError>;

    /// Delete the given keys, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// Like `multi_get`, but keyed by name and without the misses.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        let values = self.multi_get(keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    async fn set_many(
        &self,
        entries: &HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.multi_set(entries, ttl).await
    }
}
