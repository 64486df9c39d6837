//! Status command: per-ticker row counts and date coverage in the store.

use anyhow::Result;
use clap::Args;
use stocksync_lib::{Credentials, PriceStore, SyncConfig};

use crate::backend::{Backend, StoreArgs};
use crate::output::{print_status, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only show these tickers, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,
}

pub async fn run(
    args: &StatusArgs,
    config: &SyncConfig,
    creds: &Credentials,
    format: &OutputFormat,
) -> Result<()> {
    let backend = Backend::open(&args.store, config, creds)?;
    let mut summaries = backend.ticker_summaries().await?;

    if !args.tickers.is_empty() {
        let wanted: Vec<String> = args.tickers.iter().map(|t| t.trim().to_uppercase()).collect();
        summaries.retain(|s| wanted.contains(&s.ticker));
    }

    let total: u64 = summaries.iter().map(|s| s.rows).sum();
    eprintln!("{} tickers, {} rows", summaries.len(), total);
    print_status(&summaries, format)
}
