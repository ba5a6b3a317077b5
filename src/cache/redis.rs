//! Redis cache implementation using a lazily created bb8 connection pool.
//!
//! Every remote call goes through the backend's [`RetryPolicy`] and is bounded
//! by the configured socket timeout. The pool is built on first use and kept
//! for the lifetime of the backend; a failed command never rebuilds it.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::OnceCell;

use crate::cache::entry::effective_ttl;
use crate::cache::retry::RetryPolicy;
use crate::cache::{AppCache, BatchCache, CacheError};
use crate::config::settings::RedisCacheConfig;

type RedisPool = Pool<Client>;

/// Redis-based cache with bb8 connection pool.
pub struct RedisCache {
    config: RedisCacheConfig,
    pool: OnceCell<RedisPool>,
    key_prefix: Option<String>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl RedisCache {
    /// Create the backend. No connection is made until the first operation.
    pub fn new(config: &RedisCacheConfig) -> Self {
        let key_prefix = Some(config.key_prefix.trim_end_matches(':'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Self {
            config: config.clone(),
            pool: OnceCell::new(),
            key_prefix,
            retry: RetryPolicy::from_config(config),
            timeout: config.socket_timeout(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn scan_batch_size(&self) -> usize {
        self.config.scan_batch_size
    }

    fn prefixed_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn unprefixed_key(&self, key: String) -> String {
        match &self.key_prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    fn mget_cmd(&self, keys: &[String]) -> redis::Cmd {
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(self.prefixed_key(key));
        }
        cmd
    }

    /// One `SET key value [PX ms]` per entry inside MULTI/EXEC.
    fn set_pipeline(&self, entries: &HashMap<String, Vec<u8>>, ttl: Option<Duration>) -> redis::Pipeline {
        let ttl_ms = effective_ttl(ttl).map(|ttl| (ttl.as_millis() as u64).max(1));
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            let cmd = pipe.cmd("SET").arg(self.prefixed_key(key)).arg(value.as_slice());
            if let Some(ms) = ttl_ms {
                cmd.arg("PX").arg(ms);
            }
            cmd.ignore();
        }
        pipe
    }

    async fn pool(&self) -> Result<&RedisPool, CacheError> {
        self.pool
            .get_or_try_init(|| async {
                let client = Client::open(self.config.connection_url())?;
                let pool = Pool::builder()
                    .max_size(self.config.max_connections)
                    .connection_timeout(self.timeout)
                    .retry_connection(false)
                    .build(client)
                    .await
                    .map_err(CacheError::from)?;
                tracing::info!(
                    host = %self.config.host,
                    port = self.config.port,
                    db = self.config.db,
                    tls = self.config.tls_enabled,
                    max_connections = self.config.max_connections,
                    "redis connection pool created"
                );
                Ok(pool)
            })
            .await
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, Client>, CacheError> {
        self.pool().await?.get().await.map_err(|e| match e {
            RunError::User(e) => CacheError::from(e),
            RunError::TimedOut => CacheError::Timeout(self.timeout),
        })
    }

    /// Bound a single command by the socket timeout.
    async fn timed<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e: RedisError| CacheError::from(e)),
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }

    /// SCAN with a raw (already prefixed) pattern until the cursor wraps.
    async fn scan_raw(&self, pattern: &str, batch_size: usize) -> Result<Vec<String>, CacheError> {
        let batch_size = batch_size.max(1);
        collect_scan(|cursor| {
            self.retry.run("scan", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(scan_cmd(cursor, pattern, batch_size).query_async(conn_ref))
                    .await
            })
        })
        .await
    }

    async fn delete_raw(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.retry
            .run("delete_many", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(redis::cmd("DEL").arg(keys).query_async(conn_ref))
                    .await
            })
            .await
    }
}

#[async_trait]
impl AppCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let prefixed = self.prefixed_key(key);
        let prefixed = prefixed.as_str();

        self.retry
            .run("get", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(conn_ref.get(prefixed)).await
            })
            .await
            .inspect_err(|e| tracing::warn!(key = %key, error = %e, "redis GET failed"))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let prefixed = self.prefixed_key(key);
        let prefixed = prefixed.as_str();
        let value = value.as_slice();
        let ttl_ms = effective_ttl(ttl).map(|ttl| (ttl.as_millis() as u64).max(1));

        self.retry
            .run("set", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                let mut cmd = redis::cmd("SET");
                cmd.arg(prefixed).arg(value);
                if let Some(ms) = ttl_ms {
                    cmd.arg("PX").arg(ms);
                }
                self.timed(cmd.query_async(conn_ref)).await
            })
            .await
            .inspect_err(|e| tracing::warn!(key = %key, error = %e, "redis SET failed"))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let prefixed = self.prefixed_key(key);
        let prefixed = prefixed.as_str();

        self.retry
            .run("delete", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(conn_ref.del::<_, ()>(prefixed)).await
            })
            .await
            .inspect_err(|e| tracing::warn!(key = %key, error = %e, "redis DEL failed"))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let result = match &self.key_prefix {
            Some(prefix) => {
                let pattern = format!("{}:*", prefix);
                let keys = self.scan_raw(&pattern, self.config.scan_batch_size).await?;
                self.delete_raw(&keys).await.map(|removed| {
                    tracing::debug!(prefix = %prefix, removed, "redis cache cleared");
                })
            }
            None => {
                self.retry
                    .run("clear", move || async move {
                        let mut conn = self.get_conn().await?;
                        let conn_ref: &mut MultiplexedConnection = &mut conn;
                        self.timed(redis::cmd("FLUSHDB").query_async(conn_ref))
                            .await
                    })
                    .await
            }
        };
        result.inspect_err(|e| tracing::warn!(error = %e, "redis clear failed"))
    }
}

#[async_trait]
impl BatchCache for RedisCache {
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let cmd = self.mget_cmd(keys);
        let cmd = &cmd;

        let reply: redis::Value = self
            .retry
            .run("multi_get", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(cmd.query_async(conn_ref)).await
            })
            .await
            .inspect_err(|e| tracing::warn!(count = keys.len(), error = %e, "redis MGET failed"))?;
        mget_values(reply, keys.len())
    }

    async fn multi_set(
        &self,
        entries: &HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let pipe = self.set_pipeline(entries, ttl);
        let pipe = &pipe;

        self.retry
            .run("multi_set", move || async move {
                let mut conn = self.get_conn().await?;
                let conn_ref: &mut MultiplexedConnection = &mut conn;
                self.timed(pipe.query_async(conn_ref)).await
            })
            .await
            .inspect_err(|e| tracing::warn!(count = entries.len(), error = %e, "redis pipelined SET failed"))
    }

    async fn scan_keys(&self, pattern: &str, batch_size: usize) -> Result<Vec<String>, CacheError> {
        let raw_pattern = self.prefixed_key(pattern);
        let keys = self
            .scan_raw(&raw_pattern, batch_size)
            .await
            .inspect_err(|e| tracing::warn!(pattern = %pattern, error = %e, "redis SCAN failed"))?;
        Ok(keys
            .into_iter()
            .map(|key| self.unprefixed_key(key))
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        let raw: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        self.delete_raw(&raw)
            .await
            .inspect_err(|e| tracing::warn!(count = keys.len(), error = %e, "redis DEL failed"))
    }
}

fn scan_cmd(cursor: u64, pattern: &str, batch_size: usize) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(batch_size);
    cmd
}

/// Follow SCAN cursors from 0 until the server hands back 0 again. Keys seen
/// on more than one page are reported once.
async fn collect_scan<F, Fut>(mut page: F) -> Result<Vec<String>, CacheError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(u64, Vec<String>), CacheError>>,
{
    let mut cursor: u64 = 0;
    let mut keys = BTreeSet::new();
    loop {
        let (next, batch) = page(cursor).await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(keys.into_iter().collect())
}

/// Reshape an MGET reply into one slot per requested key, in request order.
fn mget_values(reply: redis::Value, expected: usize) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
    let values: Vec<Option<Vec<u8>>> = redis::from_redis_value(reply)
        .map_err(|e| CacheError::Operation(format!("unexpected MGET reply: {}", e)))?;
    if values.len() != expected {
        return Err(CacheError::Operation(format!(
            "MGET returned {} values for {} keys",
            values.len(),
            expected
        )));
    }
    Ok(values)
}
