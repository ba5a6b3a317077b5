use clap::Parser;

use mcp_cache::cli::{self, Cli, execute_command};
use mcp_cache::logger::init_logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = cli::load_config(&cli)?;
    init_logger(cli::logger_config(&cli, &settings)?)?;

    tracing::debug!(
        version = mcp_cache::pkg_version(),
        backend = ?settings.cache.backend,
        "mcp-cache starting"
    );

    let mut stdout = std::io::stdout();
    execute_command(&cli, settings, &mut stdout).await
}
