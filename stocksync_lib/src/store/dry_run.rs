//! Read-through store that never writes.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;

use crate::bar::PriceBar;
use crate::store::{PriceStore, StoreError, TickerSummary};

/// Wraps a store for `--dry-run`: reads hit the inner store, writes are
/// counted and logged but never sent.
pub struct DryRunStore<S> {
    inner: S,
    would_upsert: AtomicU64,
}

impl<S> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            would_upsert: AtomicU64::new(0),
        }
    }

    /// Rows that an upsert would have written.
    pub fn would_upsert(&self) -> u64 {
        self.would_upsert.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: PriceStore> PriceStore for DryRunStore<S> {
    async fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.latest_date(ticker).await
    }

    async fn bars_since(&self, ticker: &str, since: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        self.inner.bars_since(ticker, since).await
    }

    async fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        self.would_upsert
            .fetch_add(bars.len() as u64, Ordering::Relaxed);
        tracing::info!("[dry-run] would upsert {} rows", bars.len());
        Ok(bars.len())
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<Option<u64>, StoreError> {
        tracing::info!("[dry-run] would delete rows dated before {}", cutoff);
        Ok(None)
    }

    async fn delete_tickers(&self, tickers: &[String]) -> Result<Option<u64>, StoreError> {
        tracing::info!("[dry-run] would delete all rows for {:?}", tickers);
        Ok(None)
    }

    async fn distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        self.inner.distinct_tickers().await
    }

    async fn ticker_summaries(&self) -> Result<Vec<TickerSummary>, StoreError> {
        self.inner.ticker_summaries().await
    }
}
