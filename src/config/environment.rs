//! Deployment environment.
//!
//! Picks the `<environment>.toml` layer in the configuration directory. The
//! same type backs the `--env` flag, so CLI spellings and `MCPCACHE_APP_ENV`
//! values are interchangeable.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    Test,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl Environment {
    pub const ENV_VAR: &'static str = "MCPCACHE_APP_ENV";

    /// Environment named by `MCPCACHE_APP_ENV`, or `Development` when unset.
    ///
    /// A set but unrecognised value is an error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(Self::ENV_VAR) {
            Ok(value) if value.trim().is_empty() => Ok(Self::default()),
            Ok(value) => value.trim().parse(),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(ConfigError::EnvVarError(format!("{}: {}", Self::ENV_VAR, e))),
        }
    }

    /// Name of the environment's configuration layer, without extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true).map_err(|_| {
            ConfigError::EnvVarError(format!(
                "invalid environment '{}' in {} (expected development, test, staging or production)",
                s,
                Self::ENV_VAR
            ))
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
