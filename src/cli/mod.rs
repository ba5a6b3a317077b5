//! CLI module for mcp-cache
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing with clap
//! - Configuration loading with CLI overrides
//! - Command execution

pub mod executor;
pub mod parser;
pub mod validation;

pub use executor::execute_command;
pub use parser::{Backend, Cli, Commands};

use crate::config::{ConfigError, ConfigLoader, Settings};
use crate::logger::LoggerConfig;

/// Load configuration and apply CLI overrides
///
/// `--config` and `--env` select the configuration sources; `--backend`
/// replaces the configured cache backend after loading.
///
/// # Errors
/// Returns an error if configuration loading or validation fails
pub fn load_config(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut loader = ConfigLoader::new()?;
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    if let Some(env) = cli.env {
        loader = loader.with_environment(env);
    }

    let mut settings = loader.load()?;
    if let Some(backend) = cli.backend {
        settings.cache.backend = backend.into();
    }
    Ok(settings)
}

/// Build the logger configuration, honouring --verbose / --quiet
pub fn logger_config(cli: &Cli, settings: &Settings) -> Result<LoggerConfig, ConfigError> {
    let config = settings.logger.clone().into_logger_config()?;
    Ok(match cli.log_level_override() {
        Some(level) => config.with_level(level),
        None => config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_logger_config_honours_quiet() {
        let cli = Cli::try_parse_from(["mcp-cache", "--quiet", "check-config"]).unwrap();
        let config = logger_config(&cli, &Settings::default()).unwrap();
        assert_eq!(config.level, "error");

        let cli = Cli::try_parse_from(["mcp-cache", "check-config"]).unwrap();
        let config = logger_config(&cli, &Settings::default()).unwrap();
        assert_eq!(config.level, "info");
    }
}
