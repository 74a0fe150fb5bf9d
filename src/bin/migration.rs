use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stateset_catalog::{config, migrator};
use tracing::info;

/// Applies or rolls back the catalog schema
#[derive(Debug, Parser)]
#[command(name = "migration", version)]
struct Cli {
    /// Database URL; defaults to `database_url` from the loaded configuration
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply all pending migrations (default)
    Up,
    /// Roll back every catalog migration
    Down,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let database_url = cli.database_url.unwrap_or_else(|| cfg.database_url.clone());
    info!("Starting catalog migration ({})", cfg.environment);

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => migrator::run_migration(&database_url).await,
        Command::Down => migrator::rollback_migration(&database_url).await,
    }
}
