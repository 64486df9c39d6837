mod backend;
mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stocksync_lib::{Credentials, SyncConfig};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "stocksync")]
#[command(about = "Keep a table of daily stock prices in sync with a market-data provider")]
struct Cli {
    /// Output format: table, json, csv or markdown
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// TOML config file (STOCKSYNC_* env vars override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing bars, upsert them and evict expired rows
    Sync(Box<commands::sync::SyncArgs>),
    /// Run the retention sweep without fetching
    Prune(commands::prune::PruneArgs),
    /// Show what the store holds per ticker
    Status(commands::status::StatusArgs),
    /// List the ticker universe
    Tickers(commands::tickers::TickersArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stocksync=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let format: OutputFormat = cli.output.parse()?;
    let config = SyncConfig::load(cli.config.as_deref())?;
    let creds = Credentials::from_env();

    match &cli.command {
        Commands::Sync(args) => commands::sync::run(args, &config, &creds, &format).await?,
        Commands::Prune(args) => commands::prune::run(args, &config, &creds, &format).await?,
        Commands::Status(args) => commands::status::run(args, &config, &creds, &format).await?,
        Commands::Tickers(args) => commands::tickers::run(args, &config, &format)?,
    }

    Ok(())
}
