//! Logger Module
//!
//! A logging system based on `tracing-subscriber` with support for:
//! - Console output with color control
//! - File output in Full, Compact or JSON format

pub mod config;
pub mod error;
mod writer;


pub use config::*;
pub use error::LoggerError;

use std::io::IsTerminal;

use tracing_subscriber::layer::Layered;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use writer::open_log_file;

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Install the global subscriber described by `config`.
///
/// # Errors
/// Fails if the configuration is invalid, the log file cannot be opened, or
/// a global subscriber is already installed.
pub fn init_logger(config: LoggerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let filter = config.filter()?;
    let layers = build_layers(&config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    Ok(())
}

/// One layer per enabled output.
fn build_layers(config: &LoggerConfig) -> Result<Vec<BoxedLayer>, LoggerError> {
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    // The file layer must come before the console layer, otherwise span fields
    // formatted with ANSI codes end up in the file.
    // See: https://github.com/tokio-rs/tracing/issues/1817
    if config.file.enabled {
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(open_log_file(&config.file)?);
        layers.push(match config.file.format {
            LogFormat::Full => layer.with_target(true).boxed(),
            LogFormat::Compact => layer.with_target(true).compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        });
    }

    if config.console.enabled {
        // stdout carries command output
        let use_ansi = config.console.colored && std::io::stderr().is_terminal();
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(use_ansi)
                .with_target(true)
                .with_level(true)
                .boxed(),
        );
    }

    Ok(layers)
}
