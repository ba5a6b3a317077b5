//! Configuration validation logic
//!
//! Each settings section validates itself; [`Settings::validate`] returns the
//! first error encountered.

use std::str::FromStr;

use crate::config::error::ConfigError;
use crate::config::settings::{
    CacheConfig, FileCacheConfig, FileSettings, LoggerSettings, RedisCacheConfig,
    ResponseCacheConfig, Settings,
};
use crate::logger::{LogFormat, LoggerConfig};

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        LogFormat::from_str(&self.format)
            .map(|_| ())
            .map_err(|e| ConfigError::validation("logger.file.format", e.to_string()))
    }
}

impl LoggerSettings {
    /// The level follows the logger's own rules, so directive lists such as
    /// `warn,mcp_cache=debug` are accepted here too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let candidate = LoggerConfig {
            level: self.level.clone(),
            ..LoggerConfig::default()
        };
        candidate
            .filter()
            .map_err(|e| ConfigError::validation("logger.level", e.to_string()))?;

        self.file.validate()
    }
}

impl FileCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.trim().is_empty() {
            return Err(ConfigError::validation(
                "cache.file.directory",
                "Cache directory must not be empty.",
            ));
        }
        Ok(())
    }
}

impl RedisCacheConfig {
    /// Validate Redis settings
    ///
    /// # Validation Rules
    /// - Host must not be empty and port must be between 1 and 65535
    /// - Database index must not be negative
    /// - Socket timeout, pool size, retry attempts and scan batch size must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation(
                "cache.redis.host",
                "Redis host is required.",
            ));
        }

        if self.port == 0 {
            return Err(ConfigError::validation(
                "cache.redis.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.db < 0 {
            return Err(ConfigError::validation(
                "cache.redis.db",
                format!("Database index cannot be negative, got {}.", self.db),
            ));
        }

        if self.socket_timeout == 0 {
            return Err(ConfigError::validation(
                "cache.redis.socket_timeout",
                "Socket timeout must be greater than 0 seconds.",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "cache.redis.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.retry_attempts == 0 {
            return Err(ConfigError::validation(
                "cache.redis.retry_attempts",
                "Retry attempts must be at least 1.",
            ));
        }

        if self.scan_batch_size == 0 {
            return Err(ConfigError::validation(
                "cache.redis.scan_batch_size",
                "Scan batch size must be greater than 0.",
            ));
        }

        Ok(())
    }
}

impl ResponseCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.root_prefix.trim_end_matches(':').trim().is_empty() {
            return Err(ConfigError::validation(
                "cache.response.root_prefix",
                "Root prefix must not be empty.",
            ));
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Validate cache settings
    ///
    /// Backend sections are checked even when not selected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.file.validate()?;
        self.redis.validate()?;
        self.response.validate()
    }
}

impl Settings {
    /// Validate all configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
