//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Environment;
use crate::config::settings::CacheBackend;

/// Inspect and maintain the application cache
#[derive(Parser, Debug)]
#[command(name = "mcp-cache")]
#[command(about = "Inspect and maintain the application cache")]
#[command(long_about = "
mcp-cache operates on the cache backend selected in configuration (memory,
file or Redis) and on the response cache that stores upstream AI responses
and search results.

EXAMPLES:
    # Read a key from the configured backend
    mcp-cache get user:42

    # Store a value for ten minutes in the file backend
    mcp-cache --backend file set user:42 '{\"name\":\"Ana\"}' --ttl 600

    # List Redis keys matching a pattern
    mcp-cache --backend redis keys 'session:*'

    # Drop every cached AI response and search result
    mcp-cache purge-responses --yes

    # Validate configuration for production
    mcp-cache --env production check-config
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    ///
    /// Load this single TOML file instead of the layered configuration
    /// directory. Environment variable overrides still apply.
    ///
    /// Example: --config /etc/mcp-cache/production.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which `<environment>.toml` layer is loaded.
    ///
    /// Available values: development (dev), test, staging (stage), production (prod)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Override the configured cache backend
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Enable verbose logging
    ///
    /// Raises the log level to debug. Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Lowers the log level to error. Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the value stored under a key
    ///
    /// Exits with a non-zero status when the key is missing or expired.
    Get {
        /// Key to read
        #[arg(value_parser = super::validation::validate_key)]
        key: String,
    },
    /// Store a value under a key
    ///
    /// Examples:
    ///   mcp-cache set greeting hello             # No expiry
    ///   mcp-cache set greeting hello --ttl 60    # Expires after a minute
    Set {
        /// Key to write
        #[arg(value_parser = super::validation::validate_key)]
        key: String,

        /// Value to store, as UTF-8 text
        value: String,

        /// Time-to-live in seconds; 0 or absent means no expiry
        #[arg(long, value_name = "SECONDS")]
        ttl: Option<u64>,
    },
    /// Remove a key. Removing a missing key succeeds.
    Delete {
        /// Key to remove
        #[arg(value_parser = super::validation::validate_key)]
        key: String,
    },
    /// Remove every entry owned by the active backend
    ///
    /// For Redis without a key prefix this flushes the whole logical database.
    Clear {
        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },
    /// List Redis keys matching a glob pattern
    Keys {
        /// Glob pattern, relative to the configured key prefix
        #[arg(default_value = "*")]
        pattern: String,

        /// COUNT hint per SCAN round trip
        #[arg(long, value_name = "N", value_parser = super::validation::validate_batch_size)]
        batch_size: Option<usize>,
    },
    /// Delete every cached AI response and search result
    PurgeResponses {
        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },
    /// Load and validate configuration, then print it
    ///
    /// The Redis password is masked in the output.
    CheckConfig,
}

/// Cache backend options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    File,
    Redis,
}

impl Cli {
    /// Log level implied by --verbose / --quiet, if either was given
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }
}

impl From<Backend> for CacheBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => CacheBackend::Memory,
            Backend::File => CacheBackend::File,
            Backend::Redis => CacheBackend::Redis,
        }
    }
}
