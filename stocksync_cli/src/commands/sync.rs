//! Sync command: bring the store up to date for every ticker in the universe,
//! then evict rows older than the retention window.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use stocksync_lib::{
    Credentials, DryRunStore, PlanMode, PriceStore, SyncConfig, SyncEngine, SyncReport,
    TickerStatus,
};

use crate::backend::{Backend, Provider, ProviderKind, StoreArgs};
use crate::commands::{today_or_now, UniverseArgs};
use crate::output::{print_outcomes, OutputFormat};

#[derive(Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub universe: UniverseArgs,

    /// Market-data provider
    #[arg(long, value_enum, default_value = "yahoo")]
    pub provider: ProviderKind,

    /// Retry tickers Yahoo cannot serve on Tiingo (needs TIINGO_API_KEY)
    #[arg(long)]
    pub tiingo_fallback: bool,

    /// Re-fetch the whole retention window instead of only the missing tail
    #[arg(long)]
    pub full: bool,

    /// Do not re-fetch the newest stored day
    #[arg(long)]
    pub no_refresh_latest: bool,

    /// Tickers fetched in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Rows per upsert request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Days of history to keep
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Delete rows of tickers no longer in the universe
    #[arg(long)]
    pub prune_removed: bool,

    /// Skip the retention sweep
    #[arg(long)]
    pub no_evict: bool,

    /// Fetch and compare, but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

impl SyncArgs {
    fn apply(&self, config: &mut SyncConfig) {
        if let Some(table) = &self.store.table {
            config.table = table.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(batch) = self.batch_size {
            config.upsert_batch_size = batch;
        }
        if let Some(days) = self.retention_days {
            config.retention_days = days;
        }
        if self.no_refresh_latest {
            config.refresh_latest = false;
        }
        if self.prune_removed {
            config.prune_removed = true;
        }
        if self.no_evict {
            config.evict = false;
        }
    }
}

pub async fn run(
    args: &SyncArgs,
    config: &SyncConfig,
    creds: &Credentials,
    format: &OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    args.apply(&mut config);
    config.validate()?;

    let tickers = args.universe.resolve(&config)?.tickers();
    let tracked = args.universe.tracked(&config)?.tickers();
    let today = today_or_now(args.today);

    let backend = Backend::open(&args.store, &config, creds)?;
    let provider = Provider::build(args.provider, args.tiingo_fallback, creds)?;

    eprintln!(
        "Syncing {} tickers via {} (retention {} days{})",
        tickers.len(),
        provider_label(args),
        config.retention_days,
        if args.dry_run { ", dry run" } else { "" }
    );

    let report = if args.dry_run {
        let store = DryRunStore::new(backend);
        let report = execute(store, provider, &config, args.full, &tickers, &tracked, today).await?;
        eprintln!(
            "Dry run: {} rows would be upserted, nothing was written",
            report.rows_upserted
        );
        report
    } else {
        execute(backend, provider, &config, args.full, &tickers, &tracked, today).await?
    };

    print_summary(&report);
    print_outcomes(&report.outcomes, format)?;

    if report.aborted {
        eprintln!(
            "Warning: Circuit breaker tripped after {} consecutive failures -- {} tickers were not processed",
            config.circuit_breaker_threshold, report.skipped
        );
        bail!("Sync aborted due to circuit breaker");
    }

    Ok(())
}

fn provider_label(args: &SyncArgs) -> &'static str {
    match (args.provider, args.tiingo_fallback) {
        (ProviderKind::Yahoo, false) => "yahoo",
        (ProviderKind::Yahoo, true) => "yahoo (tiingo fallback)",
        (ProviderKind::Tiingo, _) => "tiingo",
    }
}

async fn execute<S>(
    store: S,
    provider: Provider,
    config: &SyncConfig,
    full: bool,
    tickers: &[String],
    tracked: &[String],
    today: NaiveDate,
) -> Result<SyncReport>
where
    S: PriceStore + 'static,
{
    let mut options = config.sync_options();
    if full {
        options.mode = PlanMode::Full;
    }

    let engine = SyncEngine::new(store, provider, options)
        .with_rate_limiter(config.rate_limiter())
        .with_retry_policy(config.retry_policy());

    let pb = ProgressBar::new(tickers.len() as u64);
    pb.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({eta}) {msg}",
    )?);
    pb.set_message("syncing...");

    let mut updated = 0usize;
    let mut failed = 0usize;
    let report = engine
        .run_tracked(tickers, tracked, today, |outcome| {
            match &outcome.status {
                TickerStatus::Failed(err) => {
                    failed += 1;
                    pb.println(format!("  Warning: {} failed: {}", outcome.ticker, err));
                }
                TickerStatus::Updated { .. } => updated += 1,
                TickerStatus::UpToDate | TickerStatus::NoData => {}
            }
            pb.set_message(format!("{} updated, {} err", updated, failed));
            pb.inc(1);
        })
        .await;

    match &report {
        Ok(r) => pb.finish_with_message(format!(
            "done: {} updated, {} up to date, {} failed",
            r.updated, r.up_to_date, r.failed
        )),
        Err(_) => pb.abandon_with_message("store write failed"),
    }
    Ok(report?)
}

fn print_summary(report: &SyncReport) {
    eprintln!();
    eprintln!(
        "Sync complete: {} updated, {} up to date, {} no data, {} failed, {} skipped",
        report.updated, report.up_to_date, report.no_data, report.failed, report.skipped
    );
    eprintln!(
        "  {} rows fetched, {} upserted, {} unchanged",
        report.rows_fetched, report.rows_upserted, report.rows_unchanged
    );
    eprintln!(
        "  {} provider requests ({} rate limited, {} failed, {:.1}s backoff)",
        report.requests.requests_made,
        report.requests.requests_rate_limited,
        report.requests.requests_failed,
        report.requests.total_backoff_secs
    );
    match report.rows_evicted {
        Some(n) => eprintln!("  {} rows evicted past retention", n),
        None if !report.aborted => eprintln!("  eviction skipped or count unavailable"),
        None => {}
    }
    if !report.removed_tickers.is_empty() {
        eprintln!(
            "  removed {} tickers no longer in the universe: {}",
            report.removed_tickers.len(),
            report.removed_tickers.join(", ")
        );
    }
}
