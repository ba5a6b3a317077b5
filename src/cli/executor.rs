//! Command executor for dispatching CLI commands
//!
//! Output meant for the user goes to the supplied writer; diagnostics go
//! through `tracing`.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};

use super::parser::{Cli, Commands};
use crate::cache::{BatchCache, CacheManager, RedisCache, ResponseCache};
use crate::config::settings::{CacheBackend, Settings};

/// Execute a CLI command with the given settings
///
/// # Errors
/// Returns an error when the command fails or, for `get`, when the key is absent.
pub async fn execute_command<W: Write>(
    cli: &Cli,
    settings: Settings,
    out: &mut W,
) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Get { key } => {
            let cache = CacheManager::from_config(&settings.cache)?;
            warn_if_ephemeral(&cache);
            match cache.get(key).await {
                Some(value) => writeln!(out, "{}", String::from_utf8_lossy(&value))?,
                None => bail!("key not found: {}", key),
            }
        }
        Commands::Set { key, value, ttl } => {
            let cache = CacheManager::from_config(&settings.cache)?;
            warn_if_ephemeral(&cache);
            let ttl = ttl.map(Duration::from_secs);
            if !cache.set(key, value.as_bytes().to_vec(), ttl).await {
                bail!("failed to store key '{}' in the {} backend", key, cache.backend_name());
            }
            writeln!(out, "OK")?;
        }
        Commands::Delete { key } => {
            let cache = CacheManager::from_config(&settings.cache)?;
            if !cache.delete(key).await {
                bail!("failed to delete key '{}' from the {} backend", key, cache.backend_name());
            }
            writeln!(out, "OK")?;
        }
        Commands::Clear { yes } => {
            require_confirmation(*yes, "clear")?;
            let cache = CacheManager::from_config(&settings.cache)?;
            if !cache.clear().await {
                bail!("failed to clear the {} backend", cache.backend_name());
            }
            writeln!(out, "Cleared {} cache", cache.backend_name())?;
        }
        Commands::Keys {
            pattern,
            batch_size,
        } => {
            if settings.cache.backend != CacheBackend::Redis {
                bail!("listing keys requires the redis backend (use --backend redis)");
            }
            let redis = RedisCache::new(&settings.cache.redis);
            let batch_size = batch_size.unwrap_or_else(|| redis.scan_batch_size());
            let keys = redis
                .scan_keys(pattern, batch_size)
                .await
                .context("failed to scan keys")?;
            for key in &keys {
                writeln!(out, "{}", key)?;
            }
            tracing::debug!(pattern = %pattern, count = keys.len(), "keys listed");
        }
        Commands::PurgeResponses { yes } => {
            require_confirmation(*yes, "purge-responses")?;
            let responses = ResponseCache::connect(&settings.cache);
            let removed = responses
                .clear_all()
                .await
                .context("failed to purge the response cache")?;
            writeln!(
                out,
                "Removed {} entries under '{}'",
                removed,
                responses.root_prefix()
            )?;
        }
        Commands::CheckConfig => {
            let mut shown = settings;
            if shown.cache.redis.password.is_some() {
                shown.cache.redis.password = Some("********".to_string());
            }
            writeln!(out, "Configuration is valid")?;
            writeln!(out, "{}", serde_json::to_string_pretty(&shown)?)?;
        }
    }

    Ok(())
}

fn require_confirmation(yes: bool, command: &str) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to run '{}' without --yes", command);
    }
    Ok(())
}

fn warn_if_ephemeral(cache: &CacheManager) {
    if cache.backend_name() == "memory" {
        tracing::warn!("the memory backend does not persist between invocations");
    }
}
