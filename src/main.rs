use anyhow::Result;
use clap::Parser;
use coursebook::cli::{self, Command};
use coursebook::config::CoursebookConfig;
use coursebook::telemetry;

/// Offline-first course roster client. Reads and writes go through a local
/// cache that is reconciled with the remote authority whenever it is
/// reachable.
#[derive(Debug, Parser)]
#[command(name = "coursebook", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let config = CoursebookConfig::from_env()?;
    tracing::debug!(
        api = %config.api_base_url,
        probe = %config.probe_addr,
        db = %config.paths.db_path.display(),
        "configuration resolved"
    );
    cli::run(cli.command, config).await
}
