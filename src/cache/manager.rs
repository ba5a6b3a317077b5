//! Cache manager that dispatches to the active backend.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::file::FileCache;
use crate::cache::memo::DEFAULT_MEMOIZE_TTL;
use crate::cache::memory::MemoryCache;
use crate::cache::noop::NoOpCache;
use crate::cache::redis::RedisCache;
use crate::cache::{AppCache, CacheError};
use crate::config::settings::{CacheBackend, CacheConfig};

/// Handle to the active cache backend.
///
/// Construct one at startup and pass clones to whatever needs caching; clones
/// share the same backend slot. Errors from the backend never escape: reads
/// degrade to a miss and writes report `false`.
///
/// The manager also carries the TTL that memoized functions use unless they
/// set their own.
#[derive(Clone)]
pub struct CacheManager {
    backend: Arc<ArcSwap<Arc<dyn AppCache>>>,
    memo_ttl: Option<Duration>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Create a manager backed by an in-memory cache.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryCache::new()))
    }

    pub fn with_backend(backend: Arc<dyn AppCache>) -> Self {
        Self {
            backend: Arc::new(ArcSwap::from_pointee(backend)),
            memo_ttl: Some(DEFAULT_MEMOIZE_TTL),
        }
    }

    /// Set the memoization TTL; `None` or zero stores results without expiry.
    pub fn with_memo_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.memo_ttl = ttl;
        self
    }

    pub fn memo_ttl(&self) -> Option<Duration> {
        self.memo_ttl
    }

    /// Create a manager with the backend selected in configuration.
    ///
    /// If caching is disabled, a NoOpCache is used. The Redis backend does not
    /// connect until first use.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend: Arc<dyn AppCache> = if !config.enabled {
            Arc::new(NoOpCache)
        } else {
            match config.backend {
                CacheBackend::Memory => Arc::new(MemoryCache::new()),
                CacheBackend::File => Arc::new(FileCache::new(&config.file)?),
                CacheBackend::Redis => Arc::new(RedisCache::new(&config.redis)),
            }
        };
        tracing::info!(
            backend = backend.name(),
            enabled = config.enabled,
            memoize_ttl_seconds = config.memoize_ttl_seconds,
            "cache manager initialized"
        );
        Ok(Self::with_backend(backend)
            .with_memo_ttl(Some(Duration::from_secs(config.memoize_ttl_seconds))))
    }

    /// Replace the active backend. The new backend starts cold.
    ///
    /// Calls already in flight finish on the backend they started with.
    pub fn set_backend(&self, backend: Arc<dyn AppCache>) {
        let previous = self.backend.swap(Arc::new(backend));
        tracing::info!(
            from = previous.name(),
            to = self.backend.load().name(),
            "cache backend switched"
        );
    }

    /// The currently active backend.
    pub fn backend(&self) -> Arc<dyn AppCache> {
        let active = self.backend.load();
        Arc::clone(&**active)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.load().name()
    }

    // ========================================================================
    // AppCache proxy methods
    // ========================================================================

    /// Get a value from the cache. Backend errors count as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let backend = self.backend();
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(backend = backend.name(), key = %key, error = %e, "cache get degraded to miss");
                None
            }
        }
    }

    /// Set a value in the cache. Returns whether it was stored.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> bool {
        let backend = self.backend();
        match backend.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(backend = backend.name(), key = %key, error = %e, "cache set failed");
                false
            }
        }
    }

    /// Remove a value from the cache.
    pub async fn delete(&self, key: &str) -> bool {
        let backend = self.backend();
        match backend.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(backend = backend.name(), key = %key, error = %e, "cache delete failed");
                false
            }
        }
    }

    /// Clear all values from the cache.
    pub async fn clear(&self) -> bool {
        let backend = self.backend();
        match backend.clear().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(backend = backend.name(), error = %e, "cache clear failed");
                false
            }
        }
    }

    /// Get and decode a JSON value. Undecodable payloads count as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached payload could not be decoded");
                None
            }
        }
    }

    /// Encode a value as JSON and store it.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, bytes, ttl).await,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "value could not be encoded for caching");
                false
            }
        }
    }
}
