//! Incremental sync of a ticker universe into a [`PriceStore`].
//!
//! One pass plans the missing range per ticker, fetches planned tickers
//! concurrently (Semaphore + JoinSet + mpsc), dedupes against stored rows,
//! upserts in batches and finally sweeps rows older than the retention window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::bar::{canonical_ticker, dedupe_against_existing, normalize_bars, PriceBar};
use crate::error::SyncError;
use crate::planner::{plan_fetch, FetchPlan, PlanMode, RetentionWindow};
use crate::provider::BarSource;
use crate::rate_limiter::{with_retry, RateLimiter, RetryPolicy, TrackerSummary};
use crate::store::PriceStore;

/// Tuning for a sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub retention: RetentionWindow,
    pub mode: PlanMode,
    /// Re-fetch the newest stored day of each ticker.
    pub refresh_latest: bool,
    /// Tickers fetched at the same time.
    pub concurrency: usize,
    /// Rows per upsert request.
    pub upsert_batch_size: usize,
    /// Consecutive ticker failures that abort the pass.
    pub circuit_breaker_threshold: usize,
    /// Delete stored tickers that are no longer in the universe.
    pub prune_removed: bool,
    /// Run the retention sweep after fetching.
    pub evict: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retention: RetentionWindow::default(),
            mode: PlanMode::Incremental,
            refresh_latest: true,
            concurrency: 5,
            upsert_batch_size: 100,
            circuit_breaker_threshold: 10,
            prune_removed: false,
            evict: true,
        }
    }
}

/// What happened to one ticker during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TickerStatus {
    /// A range was fetched. `written` rows were new or changed, `unchanged`
    /// rows matched the store already.
    Updated {
        start: NaiveDate,
        end: NaiveDate,
        fetched: usize,
        written: usize,
        unchanged: usize,
    },
    /// Nothing was missing; no request was made.
    UpToDate,
    /// The provider had no bars for the planned range.
    NoData,
    Failed(String),
}

impl TickerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::UpToDate => "up_to_date",
            Self::NoData => "no_data",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerOutcome {
    pub ticker: String,
    #[serde(flatten)]
    pub status: TickerStatus,
}

/// Totals for a sync or prune pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub tickers: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub no_data: usize,
    pub failed: usize,
    /// Tickers never processed because the pass was aborted.
    pub skipped: usize,
    pub rows_fetched: usize,
    pub rows_upserted: usize,
    pub rows_unchanged: usize,
    /// Rows removed by the retention sweep, when the store reports counts.
    pub rows_evicted: Option<u64>,
    pub removed_tickers: Vec<String>,
    pub rows_removed: Option<u64>,
    pub requests: TrackerSummary,
    pub aborted: bool,
    pub outcomes: Vec<TickerOutcome>,
}

impl SyncReport {
    fn new(tickers: usize) -> Self {
        Self {
            tickers,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: TickerOutcome) {
        match &outcome.status {
            TickerStatus::Updated {
                fetched, unchanged, ..
            } => {
                self.updated += 1;
                self.rows_fetched += fetched;
                self.rows_unchanged += unchanged;
            }
            TickerStatus::UpToDate => self.up_to_date += 1,
            TickerStatus::NoData => self.no_data += 1,
            TickerStatus::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Outcomes of tickers that failed.
    pub fn failures(&self) -> impl Iterator<Item = &TickerOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }
}

/// Circuit breaker to stop processing after consecutive failures.
struct CircuitBreaker {
    consecutive_failures: usize,
    threshold: usize,
}

impl CircuitBreaker {
    fn new(threshold: usize) -> Self {
        Self {
            consecutive_failures: 0,
            threshold,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    fn is_tripped(&self) -> bool {
        self.threshold > 0 && self.consecutive_failures >= self.threshold
    }
}

/// Per-ticker work done inside a fetch task.
enum Fetched {
    UpToDate,
    NoData,
    Bars {
        start: NaiveDate,
        end: NaiveDate,
        fetched: usize,
        unchanged: usize,
        bars: Vec<PriceBar>,
    },
}

/// Message sent from fetch tasks to the receiver.
struct TickerFetch {
    ticker: String,
    result: Result<Fetched, String>,
}

#[derive(Clone, Copy)]
struct PlanParams {
    today: NaiveDate,
    retention: RetentionWindow,
    mode: PlanMode,
    refresh_latest: bool,
}

/// Reconciles a [`PriceStore`] with a [`BarSource`].
pub struct SyncEngine<S, P> {
    store: Arc<S>,
    source: Arc<P>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    options: SyncOptions,
}

impl<S, P> SyncEngine<S, P>
where
    S: PriceStore + 'static,
    P: BarSource + 'static,
{
    pub fn new(store: S, source: P, options: SyncOptions) -> Self {
        Self {
            store: Arc::new(store),
            source: Arc::new(source),
            limiter: Arc::new(RateLimiter::default()),
            retry: RetryPolicy::default(),
            options,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one sync pass over `tickers` as of `today`.
    ///
    /// `on_outcome` is called once per processed ticker, in completion order.
    /// Per-ticker fetch failures never fail the pass; store write failures do.
    pub async fn run<F>(
        &self,
        tickers: &[String],
        today: NaiveDate,
        on_outcome: F,
    ) -> Result<SyncReport, SyncError>
    where
        F: FnMut(&TickerOutcome),
    {
        self.run_tracked(tickers, tickers, today, on_outcome).await
    }

    /// Like [`run`](Self::run), but only `tickers` are fetched while the
    /// removed-ticker prune keeps everything in `tracked`.
    pub async fn run_tracked<F>(
        &self,
        tickers: &[String],
        tracked: &[String],
        today: NaiveDate,
        mut on_outcome: F,
    ) -> Result<SyncReport, SyncError>
    where
        F: FnMut(&TickerOutcome),
    {
        self.validate_options()?;
        let tickers = unique_tickers(tickers);
        let mut report = SyncReport::new(tickers.len());
        let params = PlanParams {
            today,
            retention: self.options.retention,
            mode: self.options.mode,
            refresh_latest: self.options.refresh_latest,
        };

        tracing::info!(
            "Syncing {} tickers through {} (window {} days, cutoff {})",
            tickers.len(),
            self.source.name(),
            self.options.retention.days,
            self.options.retention.cutoff(today)
        );

        let concurrency = self.options.concurrency;
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<TickerFetch>(concurrency * 2);
        let mut join_set = JoinSet::new();

        for ticker in &tickers {
            let sem = Arc::clone(&semaphore);
            let sender = tx.clone();
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let limiter = Arc::clone(&self.limiter);
            let retry = self.retry;
            let ticker = ticker.clone();

            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                let result =
                    sync_ticker(&*store, &*source, &limiter, &retry, &ticker, params).await;
                let _ = sender.send(TickerFetch { ticker, result }).await;
            });
        }
        drop(tx);

        let mut breaker = CircuitBreaker::new(self.options.circuit_breaker_threshold);
        let mut buffer: Vec<PriceBar> = Vec::new();

        while let Some(fetch) = rx.recv().await {
            let status = match fetch.result {
                Ok(Fetched::UpToDate) => TickerStatus::UpToDate,
                Ok(Fetched::NoData) => TickerStatus::NoData,
                Ok(Fetched::Bars {
                    start,
                    end,
                    fetched,
                    unchanged,
                    bars,
                }) => {
                    let written = bars.len();
                    buffer.extend(bars);
                    TickerStatus::Updated {
                        start,
                        end,
                        fetched,
                        written,
                        unchanged,
                    }
                }
                Err(error) => {
                    tracing::warn!("{} failed: {}", fetch.ticker, error);
                    TickerStatus::Failed(error)
                }
            };

            if status.is_failure() {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }

            let outcome = TickerOutcome {
                ticker: fetch.ticker,
                status,
            };
            on_outcome(&outcome);
            report.record(outcome);

            while buffer.len() >= self.options.upsert_batch_size {
                let chunk: Vec<PriceBar> =
                    buffer.drain(..self.options.upsert_batch_size).collect();
                report.rows_upserted += self.store.upsert_bars(&chunk).await?;
            }

            if breaker.is_tripped() {
                tracing::warn!(
                    "Circuit breaker tripped after {} consecutive failures, stopping",
                    self.options.circuit_breaker_threshold
                );
                join_set.abort_all();
                report.aborted = true;
                break;
            }
        }

        if !buffer.is_empty() {
            report.rows_upserted += self.store.upsert_bars(&buffer).await?;
        }

        let processed = report.outcomes.len();
        report.skipped = report.tickers - processed;
        report.requests = self.limiter.tracker().summary();

        if report.aborted {
            tracing::warn!(
                "Sync aborted: {} tickers skipped, retention sweep not run",
                report.skipped
            );
            return Ok(report);
        }

        let mut tracked = unique_tickers(tracked);
        for ticker in &tickers {
            if !tracked.contains(ticker) {
                tracked.push(ticker.clone());
            }
        }
        self.sweep(&tracked, today, &mut report).await?;

        tracing::info!(
            "Sync done: {} updated, {} up to date, {} no data, {} failed, {} rows upserted",
            report.updated,
            report.up_to_date,
            report.no_data,
            report.failed,
            report.rows_upserted
        );
        Ok(report)
    }

    /// Retention sweep plus, when enabled, removal of tickers outside
    /// `universe`. Nothing is fetched.
    pub async fn prune(&self, universe: &[String], today: NaiveDate) -> Result<SyncReport, SyncError> {
        let tickers = unique_tickers(universe);
        let mut report = SyncReport::new(tickers.len());
        self.sweep(&tickers, today, &mut report).await?;
        Ok(report)
    }

    async fn sweep(
        &self,
        universe: &[String],
        today: NaiveDate,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if self.options.evict {
            let cutoff = self.options.retention.cutoff(today);
            report.rows_evicted = self.store.delete_before(cutoff).await?;
            tracing::info!(
                "Evicted rows dated before {} ({})",
                cutoff,
                report
                    .rows_evicted
                    .map_or_else(|| "count unknown".to_string(), |n| n.to_string())
            );
        }

        if !self.options.prune_removed {
            return Ok(());
        }
        if universe.is_empty() {
            tracing::warn!("Universe is empty, not pruning removed tickers");
            return Ok(());
        }

        let keep: HashSet<&str> = universe.iter().map(String::as_str).collect();
        let removed: Vec<String> = self
            .store
            .distinct_tickers()
            .await?
            .into_iter()
            .filter(|t| !keep.contains(t.as_str()))
            .collect();

        if !removed.is_empty() {
            tracing::info!("Removing {} tickers no longer in the universe: {:?}", removed.len(), removed);
            report.rows_removed = self.store.delete_tickers(&removed).await?;
        }
        report.removed_tickers = removed;
        Ok(())
    }

    fn validate_options(&self) -> Result<(), SyncError> {
        if self.options.concurrency == 0 {
            return Err(SyncError::InvalidInput("concurrency must be at least 1".into()));
        }
        if self.options.upsert_batch_size == 0 {
            return Err(SyncError::InvalidInput("upsert batch size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Canonicalize and de-duplicate, keeping first-seen order.
fn unique_tickers(tickers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .map(|t| canonical_ticker(t))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

async fn sync_ticker<S: PriceStore, P: BarSource>(
    store: &S,
    source: &P,
    limiter: &RateLimiter,
    retry: &RetryPolicy,
    ticker: &str,
    params: PlanParams,
) -> Result<Fetched, String> {
    let latest = store
        .latest_date(ticker)
        .await
        .map_err(|e| format!("reading latest date: {}", e))?;

    let (start, end) = match plan_fetch(
        latest,
        params.today,
        params.retention,
        params.mode,
        params.refresh_latest,
    ) {
        FetchPlan::UpToDate => return Ok(Fetched::UpToDate),
        FetchPlan::Range { start, end } => (start, end),
    };

    tracing::debug!("{}: fetching {}..{}", ticker, start, end);
    let raw = with_retry(limiter, retry, ticker, || {
        source.fetch_daily_bars(ticker, start, end)
    })
    .await
    .map_err(|e| e.to_string())?;

    let bars = normalize_bars(ticker, raw, start, end);
    if bars.is_empty() {
        return Ok(Fetched::NoData);
    }
    let fetched = bars.len();

    let existing = store
        .bars_since(ticker, start)
        .await
        .map_err(|e| format!("reading stored bars: {}", e))?;
    let (bars, unchanged) = dedupe_against_existing(bars, &existing);

    Ok(Fetched::Bars {
        start,
        end,
        fetched,
        unchanged,
        bars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{weekday_bars, ScriptedSource};
    use crate::provider::ProviderError;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // Friday
    fn today() -> NaiveDate {
        d(2024, 6, 14)
    }

    fn options() -> SyncOptions {
        SyncOptions {
            retention: RetentionWindow::new(10),
            ..SyncOptions::default()
        }
    }

    fn engine(
        store: MemoryStore,
        source: ScriptedSource,
        options: SyncOptions,
    ) -> SyncEngine<MemoryStore, ScriptedSource> {
        SyncEngine::new(store, source, options)
            .with_rate_limiter(RateLimiter::new(1_000, Duration::from_secs(1)))
            .with_retry_policy(RetryPolicy {
                max_retries: 2,
                base_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                max_jitter: Duration::ZERO,
            })
    }

    fn stored(ticker: &str, start: NaiveDate, end: NaiveDate, close: f64) -> Vec<PriceBar> {
        normalize_bars(ticker, weekday_bars(start, end, close), start, end)
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_store_fetches_whole_window() {
        let source = ScriptedSource::new("test");
        // Provider returns more than asked; rows outside the window are dropped.
        source.push("AAPL", Ok(weekday_bars(d(2024, 5, 27), today(), 190.0)));
        let engine = engine(MemoryStore::new(), source, options());

        let report = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await.unwrap();

        assert_eq!(report.updated, 1);
        // 2024-06-04 ..= 2024-06-14 holds nine weekdays.
        assert_eq!(report.rows_upserted, 9);
        assert_eq!(engine.store().len(), 9);
        let calls = engine.source.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("AAPL".to_string(), d(2024, 6, 4), today())]);
        assert_eq!(report.rows_evicted, Some(0));
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn incremental_refreshes_latest_and_skips_unchanged() {
        let store = MemoryStore::with_bars(stored("AAPL", d(2024, 6, 4), d(2024, 6, 12), 100.0));
        let source = ScriptedSource::new("test");
        source.push("AAPL", Ok(weekday_bars(d(2024, 6, 12), today(), 100.0)));
        let engine = engine(store, source, options());

        let mut seen = Vec::new();
        let report = engine
            .run(&tickers(&["AAPL"]), today(), |o| seen.push(o.clone()))
            .await
            .unwrap();

        assert_eq!(
            seen[0].status,
            TickerStatus::Updated {
                start: d(2024, 6, 12),
                end: today(),
                fetched: 3,
                written: 2,
                unchanged: 1,
            }
        );
        assert_eq!(report.rows_upserted, 2);
        assert_eq!(report.rows_unchanged, 1);
        assert_eq!(engine.store().latest_date("AAPL").await.unwrap(), Some(today()));
    }

    #[tokio::test]
    async fn changed_latest_bar_is_rewritten() {
        let store = MemoryStore::with_bars(stored("AAPL", d(2024, 6, 4), today(), 100.0));
        let source = ScriptedSource::new("test");
        source.push("AAPL", Ok(weekday_bars(today(), today(), 101.5)));
        let engine = engine(store, source, options());

        let report = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await.unwrap();

        assert_eq!(report.rows_upserted, 1);
        let bars = engine.store().bars_since("AAPL", today()).await.unwrap();
        assert_eq!(bars[0].close, crate::bar::to_price(101.5));
    }

    #[tokio::test]
    async fn up_to_date_makes_no_request() {
        let store = MemoryStore::with_bars(stored("MSFT", d(2024, 6, 10), today(), 400.0));
        let opts = SyncOptions {
            refresh_latest: false,
            ..options()
        };
        let engine = engine(store, ScriptedSource::new("test"), opts);

        // Sunday: Saturday and Sunday are the only missing days.
        let report = engine
            .run(&tickers(&["MSFT"]), d(2024, 6, 16), |_| {})
            .await
            .unwrap();

        assert_eq!(report.up_to_date, 1);
        assert_eq!(engine.source.call_count(), 0);
    }

    #[tokio::test]
    async fn ticker_failure_is_not_fatal() {
        let source = ScriptedSource::new("test");
        source.push("AAPL", Err(ProviderError::InvalidApiKey("test")));
        source.push("MSFT", Ok(weekday_bars(d(2024, 6, 4), today(), 400.0)));
        let engine = engine(MemoryStore::new(), source, options());

        let report = engine
            .run(&tickers(&["AAPL", "MSFT"]), today(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        let failures: Vec<&TickerOutcome> = report.failures().collect();
        assert_eq!(failures[0].ticker, "AAPL");
        assert_eq!(engine.store().distinct_tickers().await.unwrap(), vec!["MSFT"]);
    }

    #[tokio::test]
    async fn rate_limited_fetch_is_retried() {
        let source = ScriptedSource::new("test");
        source.push("AAPL", Err(ProviderError::RateLimited("test")));
        source.push("AAPL", Ok(weekday_bars(d(2024, 6, 4), today(), 190.0)));
        let engine = engine(MemoryStore::new(), source, options());

        let report = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(engine.source.call_count(), 2);
        assert_eq!(report.requests.requests_rate_limited, 1);
        assert_eq!(report.requests.requests_succeeded, 1);
    }

    #[tokio::test]
    async fn no_data_does_not_count_as_failure() {
        let engine = engine(MemoryStore::new(), ScriptedSource::new("test"), options());

        let report = engine
            .run(&tickers(&["DELISTED"]), today(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.no_data, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn circuit_breaker_aborts_pass() {
        let source = ScriptedSource::new("test");
        for t in ["A", "B", "C", "D"] {
            source.push(t, Err(ProviderError::InvalidApiKey("test")));
        }
        let old = stored("A", d(2019, 1, 2), d(2019, 1, 4), 1.0);
        let opts = SyncOptions {
            concurrency: 1,
            circuit_breaker_threshold: 2,
            ..options()
        };
        let engine = engine(MemoryStore::with_bars(old), source, opts);

        let report = engine
            .run(&tickers(&["A", "B", "C", "D"]), today(), |_| {})
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 2);
        // No sweep on an aborted pass.
        assert_eq!(report.rows_evicted, None);
        assert_eq!(engine.store().len(), 3);
    }

    #[tokio::test]
    async fn retention_sweep_evicts_old_rows() {
        let mut bars = stored("AAPL", d(2024, 5, 27), d(2024, 5, 31), 150.0);
        bars.extend(stored("AAPL", d(2024, 6, 4), today(), 150.0));
        let engine = engine(MemoryStore::with_bars(bars), ScriptedSource::new("test"), options());

        let report = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await.unwrap();

        // 2024-05-27 ..= 2024-05-31 are before the 2024-06-04 cutoff.
        assert_eq!(report.rows_evicted, Some(5));
        assert_eq!(engine.store().len(), 9);
    }

    #[tokio::test]
    async fn removed_tickers_pruned_when_enabled() {
        let mut bars = stored("AAPL", d(2024, 6, 10), today(), 190.0);
        bars.extend(stored("ATVI", d(2024, 6, 10), today(), 80.0));
        let opts = SyncOptions {
            prune_removed: true,
            ..options()
        };
        let engine = engine(MemoryStore::with_bars(bars), ScriptedSource::new("test"), opts);

        let report = engine.prune(&tickers(&["AAPL"]), today()).await.unwrap();

        assert_eq!(report.removed_tickers, vec!["ATVI".to_string()]);
        assert_eq!(report.rows_removed, Some(5));
        assert_eq!(engine.store().distinct_tickers().await.unwrap(), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn narrowed_fetch_keeps_tracked_tickers() {
        let source = ScriptedSource::new("test");
        source.push("^GSPC", Ok(weekday_bars(d(2024, 6, 10), today(), 5400.0)));
        let mut bars = stored("AAPL", d(2024, 6, 10), today(), 190.0);
        bars.extend(stored("^GSPC", d(2024, 6, 10), d(2024, 6, 13), 5400.0));
        bars.extend(stored("ATVI", d(2024, 6, 10), today(), 80.0));
        let opts = SyncOptions {
            prune_removed: true,
            ..options()
        };
        let engine = engine(MemoryStore::with_bars(bars), source, opts);

        let report = engine
            .run_tracked(
                &tickers(&["^GSPC"]),
                &tickers(&["AAPL", "^GSPC"]),
                today(),
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(report.tickers, 1);
        assert_eq!(report.removed_tickers, vec!["ATVI".to_string()]);
        assert_eq!(
            engine.store().distinct_tickers().await.unwrap(),
            vec!["AAPL", "^GSPC"]
        );
    }

    #[tokio::test]
    async fn removed_tickers_kept_by_default() {
        let bars = stored("ATVI", d(2024, 6, 10), today(), 80.0);
        let engine = engine(MemoryStore::with_bars(bars), ScriptedSource::new("test"), options());

        let report = engine.prune(&tickers(&["AAPL"]), today()).await.unwrap();

        assert!(report.removed_tickers.is_empty());
        assert_eq!(engine.store().len(), 5);
    }

    #[tokio::test]
    async fn duplicate_tickers_fetched_once() {
        let source = ScriptedSource::new("test");
        source.push("AAPL", Ok(weekday_bars(d(2024, 6, 4), today(), 190.0)));
        let engine = engine(MemoryStore::new(), source, options());

        let report = engine
            .run(&tickers(&["aapl", "AAPL", " AAPL "]), today(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.tickers, 1);
        assert_eq!(engine.source.call_count(), 1);
    }

    #[tokio::test]
    async fn small_batches_write_everything() {
        let source = ScriptedSource::new("test");
        source.push("AAPL", Ok(weekday_bars(d(2024, 6, 4), today(), 190.0)));
        source.push("MSFT", Ok(weekday_bars(d(2024, 6, 4), today(), 400.0)));
        let opts = SyncOptions {
            upsert_batch_size: 4,
            ..options()
        };
        let engine = engine(MemoryStore::new(), source, opts);

        let report = engine
            .run(&tickers(&["AAPL", "MSFT"]), today(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.rows_upserted, 18);
        assert_eq!(engine.store().len(), 18);
    }

    #[tokio::test]
    async fn full_mode_refetches_window() {
        let store = MemoryStore::with_bars(stored("AAPL", d(2024, 6, 4), today(), 190.0));
        let source = ScriptedSource::new("test");
        source.push("AAPL", Ok(weekday_bars(d(2024, 6, 4), today(), 190.0)));
        let opts = SyncOptions {
            mode: PlanMode::Full,
            ..options()
        };
        let engine = engine(store, source, opts);

        let report = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await.unwrap();

        assert_eq!(report.rows_fetched, 9);
        assert_eq!(report.rows_unchanged, 9);
        assert_eq!(report.rows_upserted, 0);
    }

    #[tokio::test]
    async fn zero_concurrency_rejected() {
        let opts = SyncOptions {
            concurrency: 0,
            ..options()
        };
        let engine = engine(MemoryStore::new(), ScriptedSource::new("test"), opts);

        let result = engine.run(&tickers(&["AAPL"]), today(), |_| {}).await;
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn status_serializes_with_tag() {
        let outcome = TickerOutcome {
            ticker: "AAPL".to_string(),
            status: TickerStatus::Failed("boom".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ticker": "AAPL", "status": "failed", "detail": "boom"})
        );
    }
}
