//! File cache implementation: one JSON file per entry.
//!
//! Files are named `<hash>.json` where `<hash>` is the first 32 hex digits of
//! the BLAKE3 digest of the key. Keys whose digests collide share a slot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::entry::CacheEntry;
use crate::cache::{AppCache, CacheError};
use crate::config::settings::FileCacheConfig;

const FILE_EXTENSION: &str = "json";
const HASH_LEN: usize = 32;

/// Disk-based cache with per-entry TTL stored alongside the value.
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(config: &FileCacheConfig) -> Result<Self, CacheError> {
        Self::with_directory(&config.directory)
    }

    pub fn with_directory(directory: impl AsRef<Path>) -> Result<Self, CacheError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| {
            tracing::error!(directory = %directory.display(), error = %e, "failed to create cache directory");
            CacheError::Io(e)
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.directory
            .join(format!("{}.{}", &digest.as_str()[..HASH_LEN], FILE_EXTENSION))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file");
                Err(CacheError::Io(e))
            }
        }
    }
}

/// Whether `name` looks like a file this backend wrote.
fn is_cache_file_name(name: &str) -> bool {
    match name.strip_suffix(FILE_EXTENSION).and_then(|s| s.strip_suffix('.')) {
        Some(stem) => {
            stem.len() == HASH_LEN
                && stem
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}

#[async_trait]
impl AppCache for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read cache file");
                return Err(CacheError::Io(e));
            }
        };

        let entry = match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "unreadable cache file treated as miss");
                return Ok(None);
            }
        };

        if entry.is_expired() {
            self.remove_file(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&CacheEntry::new(value, ttl))?;
        tokio::fs::write(self.path_for(key), bytes)
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "failed to write cache file");
                CacheError::Io(e)
            })
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove_file(&self.path_for(key)).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            tracing::warn!(directory = %self.directory.display(), error = %e, "failed to list cache directory");
            CacheError::Io(e)
        })?;

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let is_ours = entry
                .file_name()
                .to_str()
                .is_some_and(is_cache_file_name);
            if is_ours {
                self.remove_file(&entry.path()).await?;
                removed += 1;
            }
        }

        tracing::debug!(directory = %self.directory.display(), removed, "file cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn test_cache() -> (TempDir, FileCache) {
        let dir = tempdir().unwrap();
        let cache = FileCache::with_directory(dir.path()).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_get_set() {
        let (_dir, cache) = test_cache();
        cache.set("key", b"value".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (_dir, cache) = test_cache();
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_format() {
        let (_dir, cache) = test_cache();
        cache
            .set("key", b"v".to_vec(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let raw = std::fs::read(cache.path_for("key")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["value"], serde_json::json!("v"));
        assert!(json["expires_at"].as_f64().is_some());

        cache.set("forever", b"v".to_vec(), None).await.unwrap();
        let raw = std::fs::read(cache.path_for("forever")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(json["expires_at"].is_null());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, cache) = test_cache();
        cache.set("key", b"value".to_vec(), None).await.unwrap();
        cache.delete("key").await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
        assert!(cache.delete("key").await.is_ok());
    }

    #[tokio::test]
    async fn test_ttl_expiration_removes_file() {
        let (_dir, cache) = test_cache();
        cache
            .set("key", b"value".to_vec(), Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.path_for("key").exists());
        assert_eq!(cache.get("key").await.unwrap(), None);
        assert!(!cache.path_for("key").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let (_dir, cache) = test_cache();
        std::fs::write(cache.path_for("key"), b"{not json").unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_external_removal_is_a_miss() {
        let (_dir, cache) = test_cache();
        cache.set("key", b"value".to_vec(), None).await.unwrap();
        std::fs::remove_file(cache.path_for("key")).unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_leaves_unrelated_files() {
        let (dir, cache) = test_cache();
        cache.set("k1", b"v1".to_vec(), None).await.unwrap();
        cache.set("k2", b"v2".to_vec(), None).await.unwrap();
        std::fs::write(dir.path().join("notes.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("README"), b"keep me").unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.get("k1").await.unwrap(), None);
        assert_eq!(cache.get("k2").await.unwrap(), None);
        assert!(dir.path().join("notes.json").exists());
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn test_cache_file_name_pattern() {
        assert!(is_cache_file_name("0123456789abcdef0123456789abcdef.json"));
        assert!(!is_cache_file_name("0123456789ABCDEF0123456789abcdef.json"));
        assert!(!is_cache_file_name("short.json"));
        assert!(!is_cache_file_name("0123456789abcdef0123456789abcdef.txt"));
        assert!(!is_cache_file_name("0123456789abcdef0123456789abcdefjson"));
    }

    #[test]
    fn test_path_is_stable() {
        let (_dir, cache) = test_cache();
        assert_eq!(cache.path_for("a"), cache.path_for("a"));
        assert_ne!(cache.path_for("a"), cache.path_for("b"));
    }
}
