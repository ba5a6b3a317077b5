//! Cache for upstream AI responses and search results.
//!
//! Entries are keyed by the SHA-256 digest of the full request, canonicalised
//! as JSON with sorted keys, under `"<root>:<namespace>:"`. Unlike the
//! [`CacheManager`](crate::cache::CacheManager) this talks to its own store
//! handle, since purging needs key scans the generic contract does not offer.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::cache::redis::RedisCache;
use crate::cache::{BatchCache, CacheError};
use crate::config::settings::{CacheConfig, RedisCacheConfig, ResponseCacheConfig};

const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Payload family of a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Response,
    Search,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Response => "response",
            Namespace::Search => "search",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "response" => Ok(Namespace::Response),
            "search" => Ok(Namespace::Search),
            other => Err(CacheError::Operation(format!("unknown namespace: {}", other))),
        }
    }
}

/// Read-through cache for expensive upstream calls.
pub struct ResponseCache<S = RedisCache> {
    store: S,
    root: String,
    default_ttl: Duration,
    scan_batch_size: usize,
}

impl ResponseCache<RedisCache> {
    /// Build a cache with its own Redis handle.
    ///
    /// The generic backend key prefix is not applied here; keys live directly
    /// under the response root prefix.
    pub fn connect(config: &CacheConfig) -> Self {
        let redis = RedisCacheConfig {
            key_prefix: String::new(),
            ..config.redis.clone()
        };
        Self::with_store(RedisCache::new(&redis), &config.response)
            .with_scan_batch_size(config.redis.scan_batch_size)
    }
}

impl<S: BatchCache> ResponseCache<S> {
    pub fn with_store(store: S, config: &ResponseCacheConfig) -> Self {
        Self {
            store,
            root: config.root_prefix.trim_end_matches(':').to_string(),
            default_ttl: Duration::from_secs(config.ttl_seconds),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    pub fn with_scan_batch_size(mut self, batch_size: usize) -> Self {
        self.scan_batch_size = batch_size.max(1);
        self
    }

    pub fn root_prefix(&self) -> &str {
        &self.root
    }

    /// Key for a request in the given namespace.
    pub fn key_for(&self, namespace: Namespace, request: &Map<String, Value>) -> String {
        // serde_json::Map is ordered by key, so this is canonical.
        let canonical = Value::Object(request.clone()).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{}:{}:{:x}", self.root, namespace, digest)
    }

    pub async fn get_cached_response(
        &self,
        prompt: &str,
        model: &str,
        extra: &Map<String, Value>,
    ) -> Option<Value> {
        let request = response_request(prompt, model, extra);
        self.lookup(Namespace::Response, &request).await
    }

    pub async fn cache_response(
        &self,
        prompt: &str,
        response: &Value,
        model: &str,
        ttl: Option<Duration>,
        extra: &Map<String, Value>,
    ) -> bool {
        let request = response_request(prompt, model, extra);
        self.store(Namespace::Response, &request, response, ttl).await
    }

    pub async fn get_cached_search(&self, query: &str, extra: &Map<String, Value>) -> Option<Value> {
        let request = search_request(query, extra);
        self.lookup(Namespace::Search, &request).await
    }

    pub async fn cache_search_results(
        &self,
        query: &str,
        results: &Value,
        ttl: Option<Duration>,
        extra: &Map<String, Value>,
    ) -> bool {
        let request = search_request(query, extra);
        self.store(Namespace::Search, &request, results, ttl).await
    }

    /// Delete the entry for one request. Returns whether the delete succeeded.
    pub async fn invalidate(&self, namespace: Namespace, request: &Map<String, Value>) -> bool {
        let key = self.key_for(namespace, request);
        match self.store.delete(&key).await {
            Ok(()) => {
                tracing::info!(key = %key, "response cache entry invalidated");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "response cache invalidation failed");
                false
            }
        }
    }

    /// Delete every entry under the root prefix, returning how many were removed.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        let pattern = format!("{}:*", self.root);
        let keys = self.store.scan_keys(&pattern, self.scan_batch_size).await?;
        let removed = self.store.delete_many(&keys).await?;
        tracing::info!(root = %self.root, removed, "response cache cleared");
        Ok(removed)
    }

    async fn lookup(&self, namespace: Namespace, request: &Map<String, Value>) -> Option<Value> {
        let key = self.key_for(namespace, request);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "response cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::info!(key = %key, namespace = %namespace, "response cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached response could not be decoded");
                None
            }
        }
    }

    async fn store(
        &self,
        namespace: Namespace,
        request: &Map<String, Value>,
        payload: &Value,
        ttl: Option<Duration>,
    ) -> bool {
        let key = self.key_for(namespace, request);
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(self.default_ttl);
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "response could not be encoded");
                return false;
            }
        };
        match self.store.set(&key, bytes, Some(ttl)).await {
            Ok(()) => {
                tracing::info!(key = %key, ttl_secs = ttl.as_secs(), "response cached");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "response could not be cached");
                false
            }
        }
    }
}

fn response_request(prompt: &str, model: &str, extra: &Map<String, Value>) -> Map<String, Value> {
    let mut request = extra.clone();
    request.insert("prompt".to_string(), Value::from(prompt));
    request.insert("model".to_string(), Value::from(model));
    request
}

fn search_request(query: &str, extra: &Map<String, Value>) -> Map<String, Value> {
    let mut request = extra.clone();
    request.insert("query".to_string(), Value::from(query));
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::cache::AppCache;

    /// Batch-capable store over a plain map. Only trailing `*` globs are supported.
    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        ttls: Mutex<HashMap<String, Option<Duration>>>,
    }

    #[async_trait]
    impl AppCache for MapStore {
        fn name(&self) -> &'static str {
            "map"
        }
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
        async fn clear(&self) -> Result<(), CacheError> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }
    }

    #[async_trait]
    impl BatchCache for MapStore {
        async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
            let entries = self.entries.lock().unwrap();
            Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
        }
        async fn multi_set(
            &self,
            entries: &HashMap<String, Vec<u8>>,
            _ttl: Option<Duration>,
        ) -> Result<(), CacheError> {
            self.entries.lock().unwrap().extend(entries.clone());
            Ok(())
        }
        async fn scan_keys(&self, pattern: &str, _batch_size: usize) -> Result<Vec<String>, CacheError> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .entries
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
        async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
            let mut entries = self.entries.lock().unwrap();
            Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count())
        }
    }

    fn cache() -> ResponseCache<MapStore> {
        ResponseCache::with_store(MapStore::default(), &ResponseCacheConfig::default())
    }

    fn extra(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_key_layout() {
        let cache = cache();
        let key = cache.key_for(Namespace::Search, &extra(json!({"query": "rust"})));
        let parts: Vec<&str> = key.splitn(3, ':').collect();
        assert_eq!(parts[0], "claude");
        assert_eq!(parts[1], "search");
        assert_eq!(parts[2].len(), 64);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_ignores_parameter_order() {
        let cache = cache();
        let mut a = Map::new();
        a.insert("model".into(), json!("m"));
        a.insert("prompt".into(), json!("x"));
        let mut b = Map::new();
        b.insert("prompt".into(), json!("x"));
        b.insert("model".into(), json!("m"));
        assert_eq!(
            cache.key_for(Namespace::Response, &a),
            cache.key_for(Namespace::Response, &b)
        );
        assert_ne!(
            cache.key_for(Namespace::Response, &a),
            cache.key_for(Namespace::Search, &a)
        );
    }

    #[test]
    fn test_namespace_parse() {
        assert_eq!("response".parse::<Namespace>().unwrap(), Namespace::Response);
        assert_eq!("SEARCH".parse::<Namespace>().unwrap(), Namespace::Search);
        assert!("other".parse::<Namespace>().is_err());
    }

    #[tokio::test]
    async fn test_response_round_trip_and_invalidate() {
        let cache = cache();
        let response = json!({"text": "hello", "tokens": 12});
        let none = Map::new();

        assert_eq!(cache.get_cached_response("x", "m", &none).await, None);
        assert!(cache.cache_response("x", &response, "m", None, &none).await);
        assert_eq!(cache.get_cached_response("x", "m", &none).await, Some(response));
        assert_eq!(cache.get_cached_response("x", "other", &none).await, None);

        let request = extra(json!({"prompt": "x", "model": "m"}));
        assert!(cache.invalidate(Namespace::Response, &request).await);
        assert_eq!(cache.get_cached_response("x", "m", &none).await, None);
    }

    #[tokio::test]
    async fn test_extra_parameters_are_part_of_the_key() {
        let cache = cache();
        let results = json!([{"title": "a"}]);
        let page_one = extra(json!({"page": 1}));
        let page_two = extra(json!({"page": 2}));

        assert!(cache.cache_search_results("rust", &results, None, &page_one).await);
        assert_eq!(cache.get_cached_search("rust", &page_one).await, Some(results));
        assert_eq!(cache.get_cached_search("rust", &page_two).await, None);
    }

    #[tokio::test]
    async fn test_ttl_defaults_and_overrides() {
        let cache = cache();
        let none = Map::new();
        cache.cache_search_results("a", &json!(1), None, &none).await;
        cache
            .cache_search_results("b", &json!(2), Some(Duration::from_secs(60)), &none)
            .await;
        cache
            .cache_search_results("c", &json!(3), Some(Duration::ZERO), &none)
            .await;

        let ttls = cache.store.ttls.lock().unwrap();
        let ttl_of = |query: &str| {
            let key = cache.key_for(Namespace::Search, &search_request(query, &none));
            ttls.get(&key).copied().flatten()
        };
        assert_eq!(ttl_of("a"), Some(Duration::from_secs(3600)));
        assert_eq!(ttl_of("b"), Some(Duration::from_secs(60)));
        assert_eq!(ttl_of("c"), Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_clear_all_only_touches_root_prefix() {
        let cache = cache();
        let none = Map::new();
        cache.cache_response("p1", &json!("r1"), "m", None, &none).await;
        cache.cache_search_results("q1", &json!("s1"), None, &none).await;
        cache.store.set("unrelated", b"keep".to_vec(), None).await.unwrap();

        assert_eq!(cache.clear_all().await.unwrap(), 2);
        assert_eq!(cache.get_cached_response("p1", "m", &none).await, None);
        assert_eq!(cache.store.get("unrelated").await.unwrap(), Some(b"keep".to_vec()));
        assert_eq!(cache.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_a_miss() {
        let cache = cache();
        let none = Map::new();
        let key = cache.key_for(Namespace::Search, &search_request("q", &none));
        cache.store.set(&key, b"{not json".to_vec(), None).await.unwrap();
        assert_eq!(cache.get_cached_search("q", &none).await, None);
    }

    #[test]
    fn test_connect_drops_generic_key_prefix() {
        let mut config = CacheConfig::default();
        config.redis.key_prefix = "mcp".to_string();
        config.response.root_prefix = "claude:".to_string();
        let cache = ResponseCache::connect(&config);
        assert_eq!(cache.root_prefix(), "claude");
    }
}
