//! Memory cache implementation using a concurrent map.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::entry::CacheEntry;
use crate::cache::{AppCache, CacheError};

/// In-process cache with per-entry TTL and lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    store: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppCache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self.store.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        // The read guard is released; a writer may have refreshed the entry meanwhile.
        self.store.remove_if(key, |_, entry| entry.is_expired());
        tracing::debug!(key = %key, "expired entry purged from memory cache");
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.store
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryCache::new();
        cache.set("key", b"value".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let cache = MemoryCache::new();
        cache.set("key", b"old".to_vec(), None).await.unwrap();
        cache.set("key", b"new".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_empty_value_is_not_a_miss() {
        let cache = MemoryCache::new();
        cache.set("key", Vec::new(), None).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = MemoryCache::new();
        cache.set("key", b"value".to_vec(), None).await.unwrap();
        cache.delete("key").await.unwrap();
        cache.delete("key").await.unwrap();
        cache.delete("never-set").await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiration_purges_entry() {
        let cache = MemoryCache::new();
        cache
            .set("key", b"value".to_vec(), Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.store.contains_key("key"));
        assert_eq!(cache.get("key").await.unwrap(), None);
        assert!(!cache.store.contains_key("key"));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("k1", b"v1".to_vec(), None).await.unwrap();
        cache.set("k2", b"v2".to_vec(), None).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), None);
        assert_eq!(cache.get("k2").await.unwrap(), None);
        assert!(cache.store.is_empty());
    }

    #[tokio::test]
    async fn test_user_profile_expires_after_two_seconds() {
        let cache = MemoryCache::new();
        let profile = serde_json::to_vec(&serde_json::json!({"name": "Ana"})).unwrap();
        cache
            .set("user:42", profile.clone(), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        let hit = cache.get("user:42").await.unwrap().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&hit).unwrap();
        assert_eq!(decoded, serde_json::json!({"name": "Ana"}));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.get("user:42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_keys() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    let key = format!("k:{i}:{j}");
                    cache.set(&key, vec![i as u8], None).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.store.len(), 16 * 50);
    }
}
