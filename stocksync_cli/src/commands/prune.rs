//! Prune command: retention sweep and removed-ticker cleanup without fetching.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use stocksync_lib::{Credentials, DryRunStore, PriceStore, SyncConfig, SyncEngine, SyncReport};

use crate::backend::{Backend, Provider, ProviderKind, StoreArgs};
use crate::commands::{today_or_now, UniverseArgs};
use crate::output::{print_json, OutputFormat};

#[derive(Args)]
pub struct PruneArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub universe: UniverseArgs,

    /// Also delete rows of tickers no longer in the universe
    #[arg(long)]
    pub removed: bool,

    /// Days of history to keep
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

pub async fn run(
    args: &PruneArgs,
    config: &SyncConfig,
    creds: &Credentials,
    format: &OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(table) = &args.store.table {
        config.table = table.clone();
    }
    if let Some(days) = args.retention_days {
        config.retention_days = days;
    }
    if args.removed {
        config.prune_removed = true;
    }
    config.validate()?;

    let tickers = kept_tickers(args, &config)?;
    let today = today_or_now(args.today);
    let cutoff = config.retention().cutoff(today);
    let backend = Backend::open(&args.store, &config, creds)?;

    let report = if args.dry_run {
        let removed = removed_tickers(&backend, &tickers, config.prune_removed).await?;
        eprintln!(
            "Dry run: would delete rows dated before {}{}",
            cutoff,
            if removed.is_empty() {
                String::new()
            } else {
                format!(" and all rows of {}", removed.join(", "))
            }
        );
        prune(DryRunStore::new(backend), &config, &tickers, today).await?
    } else {
        prune(backend, &config, &tickers, today).await?
    };

    eprintln!(
        "Prune complete: cutoff {}, {} rows evicted, {} tickers removed",
        cutoff,
        count_label(report.rows_evicted),
        report.removed_tickers.len()
    );

    if matches!(format, OutputFormat::Json) {
        print_json(&report);
    } else if !report.removed_tickers.is_empty() {
        println!("Removed: {}", report.removed_tickers.join(", "));
    }
    Ok(())
}

/// Tickers whose rows survive a removed-ticker prune. `--group` only narrows
/// what a sync fetches, so it never shrinks this list.
fn kept_tickers(args: &PruneArgs, config: &SyncConfig) -> Result<Vec<String>> {
    if !config.prune_removed {
        return Ok(Vec::new());
    }
    Ok(args.universe.tracked(config)?.tickers())
}

async fn prune<S>(
    store: S,
    config: &SyncConfig,
    tickers: &[String],
    today: NaiveDate,
) -> Result<SyncReport>
where
    S: PriceStore + 'static,
{
    // The sweep never fetches, but the engine still wants a source.
    let provider = Provider::build(ProviderKind::Yahoo, false, &Credentials::default())?;
    let engine = SyncEngine::new(store, provider, config.sync_options());
    Ok(engine.prune(tickers, today).await?)
}

async fn removed_tickers<S: PriceStore>(
    store: &S,
    universe: &[String],
    enabled: bool,
) -> Result<Vec<String>> {
    if !enabled || universe.is_empty() {
        return Ok(Vec::new());
    }
    let stored = store.distinct_tickers().await?;
    Ok(stored
        .into_iter()
        .filter(|t| !universe.contains(t))
        .collect())
}

fn count_label(count: Option<u64>) -> String {
    count.map_or_else(|| "unknown".to_string(), |n| n.to_string())
}
