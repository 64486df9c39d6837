//! Tickers command: show the resolved universe.

use anyhow::Result;
use clap::Args;
use stocksync_lib::SyncConfig;

use crate::commands::UniverseArgs;
use crate::output::{print_universe, OutputFormat};

#[derive(Args)]
pub struct TickersArgs {
    #[command(flatten)]
    pub universe: UniverseArgs,
}

pub fn run(args: &TickersArgs, config: &SyncConfig, format: &OutputFormat) -> Result<()> {
    let universe = args.universe.resolve(config)?;
    eprintln!(
        "{} tickers in {} groups",
        universe.tickers().len(),
        universe.groups.len()
    );
    print_universe(&universe, format)
}
