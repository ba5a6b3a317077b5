//! Cache module providing runtime-configurable caching with multiple backends.
//!
//! This module provides a unified caching interface that supports:
//! - Memory cache (in-process, fastest)
//! - File cache (persistent, one JSON file per key)
//! - Redis cache (distributed, network-based, with retries and batch operations)
//!
//! # Configuration
//!
//! Configure caching in your TOML config file:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"  # or "file" or "redis"
//! memoize_ttl_seconds = 3600
//!
//! [cache.file]
//! directory = "cache"
//!
//! [cache.redis]
//! host = "localhost"
//! port = 6379
//! db = 0
//! socket_timeout = 5
//! max_connections = 10
//! key_prefix = ""
//! tls_enabled = false
//!
//! [cache.response]
//! root_prefix = "claude"
//! ttl_seconds = 3600
//! ```
//!
//! # Usage
//!
//! Use the `memoized` attribute to cache a function's results:
//!
//! ```ignore
//! #[memoized(name = "room_info", ttl = 60)]
//! async fn room_info(cache: &CacheManager, room_id: &str) -> Result<RoomInfo, ProviderError> {
//!     provider.room_info(room_id).await
//! }
//! ```

mod entry;
mod error;
mod file;
mod manager;
mod memo;
mod memory;
mod noop;
mod redis;
mod response;
mod retry;
mod traits;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use file::FileCache;
pub use manager::CacheManager;
pub use mcp_cache_macros::memoized;
pub use memo::{CallKey, DEFAULT_MEMOIZE_TTL, Memoizer};
pub use memory::MemoryCache;
pub use noop::NoOpCache;
pub use redis::RedisCache;
pub use response::{Namespace, ResponseCache};
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
pub use traits::{AppCache, BatchCache};

// Re-export config types
pub use crate::config::settings::{
    CacheBackend, CacheConfig, FileCacheConfig, RedisCacheConfig, ResponseCacheConfig,
};
