//! Memoization of function results through the [`CacheManager`].
//!
//! A [`CallKey`] identifies one invocation: the function name, its positional
//! arguments in order and its named arguments sorted by name. Each argument is
//! canonicalised to JSON, so maps and structs produce the same text on every run.
//!
//! ```ignore
//! let memo = Memoizer::new(cache.clone());
//! let key = CallKey::new("search_docs").arg(&query).kwarg("limit", &10);
//! let hits = memo.call_async(key, || search_docs(&query, 10)).await;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::CacheManager;

/// TTL applied to memoized results unless overridden.
pub const DEFAULT_MEMOIZE_TTL: Duration = Duration::from_secs(3600);

const DIGEST_LEN: usize = 32;

/// Identity of a single function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallKey {
    function: String,
    positional: Vec<String>,
    named: BTreeMap<String, String>,
    keyable: bool,
}

impl CallKey {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            positional: Vec::new(),
            named: BTreeMap::new(),
            keyable: true,
        }
    }

    /// Append a positional argument. Order matters.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match canonical(value) {
            Some(text) => self.positional.push(text),
            None => self.keyable = false,
        }
        self
    }

    /// Add a named argument. Insertion order does not matter.
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        match canonical(value) {
            Some(text) => {
                self.named.insert(name.into(), text);
            }
            None => self.keyable = false,
        }
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Cache key for this call, or `None` if an argument could not be serialized.
    pub fn digest(&self) -> Option<String> {
        if !self.keyable {
            return None;
        }
        // Encoded as a JSON array so adjacent parts cannot run together.
        let encoded = serde_json::to_vec(&(&self.function, &self.positional, &self.named)).ok()?;
        let hash = blake3::hash(&encoded).to_hex();
        Some(hash.as_str()[..DIGEST_LEN].to_string())
    }
}

fn canonical<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    // Going through `Value` sorts map keys.
    serde_json::to_value(value)
        .and_then(|v| serde_json::to_string(&v))
        .ok()
}

/// Runs functions through the cache, storing results on a miss.
///
/// Caching is best-effort: if the cache is unavailable or a value cannot be
/// encoded, the function still runs and its result is returned.
#[derive(Clone)]
pub struct Memoizer {
    cache: CacheManager,
    ttl: Option<Duration>,
}

impl Memoizer {
    /// Memoize through `cache`, using its configured memo TTL.
    pub fn new(cache: CacheManager) -> Self {
        let ttl = cache.memo_ttl();
        Self { cache, ttl }
    }

    /// Override the TTL; `None` stores results without expiry.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Memoize a synchronous function.
    pub async fn call<T, F>(&self, key: CallKey, f: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let (digest, hit) = self.lookup(&key).await;
        if let Some(value) = hit {
            return value;
        }
        let value = f();
        self.store(&key, digest, &value).await;
        value
    }

    /// Memoize an async function.
    pub async fn call_async<T, F, Fut>(&self, key: CallKey, f: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let (digest, hit) = self.lookup(&key).await;
        if let Some(value) = hit {
            return value;
        }
        let value = f().await;
        self.store(&key, digest, &value).await;
        value
    }

    /// Memoize a fallible async function. Only `Ok` results are cached and
    /// errors are passed through untouched.
    pub async fn try_call_async<T, E, F, Fut>(&self, key: CallKey, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (digest, hit) = self.lookup(&key).await;
        if let Some(value) = hit {
            return Ok(value);
        }
        let value = f().await?;
        self.store(&key, digest, &value).await;
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CallKey) -> (Option<String>, Option<T>) {
        let Some(digest) = key.digest() else {
            tracing::debug!(function = key.function(), "arguments not serializable, bypassing cache");
            return (None, None);
        };
        let hit = self.cache.get_json::<T>(&digest).await;
        if hit.is_some() {
            tracing::debug!(function = key.function(), "memoized call hit");
        } else {
            tracing::debug!(function = key.function(), "memoized call miss");
        }
        (Some(digest), hit)
    }

    async fn store<T: Serialize>(&self, key: &CallKey, digest: Option<String>, value: &T) {
        let Some(digest) = digest else {
            return;
        };
        if !self.cache.set_json(&digest, value, self.ttl).await {
            tracing::debug!(function = key.function(), "memoized result not stored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;

    use crate::cache::{AppCache, CacheError};

    struct BrokenCache;

    #[async_trait]
    impl AppCache for BrokenCache {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn set(&self, _: &str, _: Vec<u8>, _: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    #[test]
    fn test_digest_is_stable_and_sized() {
        let a = CallKey::new("f").arg(&1).arg("x").digest().unwrap();
        let b = CallKey::new("f").arg(&1).arg("x").digest().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_positional_order_matters() {
        let a = CallKey::new("f").arg(&1).arg(&2).digest();
        let b = CallKey::new("f").arg(&2).arg(&1).digest();
        assert_ne!(a, b);
    }

    #[test]
    fn test_function_name_matters() {
        let a = CallKey::new("f").arg(&1).digest();
        let b = CallKey::new("g").arg(&1).digest();
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_and_number_do_not_collide() {
        let a = CallKey::new("f").arg("1").digest();
        let b = CallKey::new("f").arg(&1).digest();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parts_do_not_run_together() {
        let positional = CallKey::new("f").arg(&true).arg(&1).digest();
        let named = CallKey::new("f").kwarg("true", &1).digest();
        assert_ne!(positional, named);

        let in_name = CallKey::new("f:1").digest();
        let as_arg = CallKey::new("f").arg(&1).digest();
        assert_ne!(in_name, as_arg);

        let split = CallKey::new("f").arg("a:b").digest();
        let joined = CallKey::new("f").arg("a").arg("b").digest();
        assert_ne!(split, joined);
    }

    #[test]
    fn test_unserializable_argument_disables_key() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        assert_eq!(CallKey::new("f").arg(&bad).digest(), None);
    }

    proptest! {
        /// Named arguments produce the same key in any insertion order
        #[test]
        fn property_named_argument_order_is_irrelevant(
            args in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)
        ) {
            let forward = args
                .iter()
                .fold(CallKey::new("f"), |key, (k, v)| key.kwarg(k.clone(), v));
            let backward = args
                .iter()
                .rev()
                .fold(CallKey::new("f"), |key, (k, v)| key.kwarg(k.clone(), v));
            prop_assert_eq!(forward.digest(), backward.digest());
        }
    }

    #[tokio::test]
    async fn test_sync_function_runs_once() {
        let memo = Memoizer::new(CacheManager::new());
        let calls = AtomicU32::new(0);
        let square = |n: u64| {
            calls.fetch_add(1, Ordering::SeqCst);
            n * n
        };

        let first = memo.call(CallKey::new("square").arg(&7), || square(7)).await;
        let second = memo.call(CallKey::new("square").arg(&7), || square(7)).await;

        assert_eq!((first, second), (49, 49));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_function_runs_once_with_reordered_named_args() {
        let memo = Memoizer::new(CacheManager::new());
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let search = |query: &'static str| async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            vec![format!("{query}-result")]
        };

        let key_a = CallKey::new("search").kwarg("query", "rust").kwarg("limit", &5);
        let key_b = CallKey::new("search").kwarg("limit", &5).kwarg("query", "rust");

        let first = memo.call_async(key_a, || search("rust")).await;
        let second = memo.call_async(key_b, || search("rust")).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_arguments_miss() {
        let memo = Memoizer::new(CacheManager::new());
        let calls = AtomicU32::new(0);

        for n in [1u32, 2, 1] {
            memo.call(CallKey::new("id").arg(&n), || {
                calls.fetch_add(1, Ordering::SeqCst);
                n
            })
            .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let memo = Memoizer::new(CacheManager::new());
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let failed: Result<u32, String> = memo
            .try_call_async(CallKey::new("flaky"), || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err("upstream down".to_string())
            })
            .await;
        assert_eq!(failed, Err("upstream down".to_string()));

        let ok: Result<u32, String> = memo
            .try_call_async(CallKey::new("flaky"), || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;
        assert_eq!(ok, Ok(42));

        let cached: Result<u32, String> = memo
            .try_call_async(CallKey::new("flaky"), || async { Ok(0) })
            .await;
        assert_eq!(cached, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_broken_cache_still_runs_function() {
        let memo = Memoizer::new(CacheManager::with_backend(Arc::new(BrokenCache)));
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let value = memo
                .call(CallKey::new("answer"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .await;
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_applies_to_results() {
        let memo = Memoizer::new(CacheManager::new()).with_ttl(Some(Duration::from_millis(100)));
        let calls = AtomicU32::new(0);
        let run = || {
            calls.fetch_add(1, Ordering::SeqCst);
            "v".to_string()
        };

        memo.call(CallKey::new("ttl"), run).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        memo.call(CallKey::new("ttl"), run).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ttl_comes_from_manager() {
        let config = crate::config::settings::CacheConfig {
            memoize_ttl_seconds: 60,
            ..Default::default()
        };
        let cache = CacheManager::from_config(&config).unwrap();
        assert_eq!(Memoizer::new(cache.clone()).ttl, Some(Duration::from_secs(60)));
        assert_eq!(Memoizer::new(cache).with_ttl(None).ttl, None);
        assert_eq!(Memoizer::new(CacheManager::new()).ttl, Some(DEFAULT_MEMOIZE_TTL));
    }
}
