//! Backend for `cache.enabled = false`.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{AppCache, CacheError};

/// Accepts every write and forgets it, so lookups always miss and memoized
/// functions always run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCache;

#[async_trait]
impl AppCache for NoOpCache {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tracing::trace!(key = %key, "cache disabled, miss");
        Ok(None)
    }

    async fn set(&self, _: &str, _: Vec<u8>, _: Option<Duration>) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
