//! Persistence of price bars.
//!
//! [`PriceStore`] is the table-level contract the sync engine reconciles
//! against. Every write is an upsert keyed by `(ticker, date)`, so a store
//! never holds two rows for the same key.

pub mod dry_run;
pub mod memory;
pub mod rest;
pub mod sqlite;

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;

use crate::bar::PriceBar;

pub use dry_run::DryRunStore;
pub use memory::MemoryStore;
pub use rest::RestStore;
pub use sqlite::SqliteStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("table store error: {0}")]
    Rest(#[from] tablestore_api::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name: {0}")]
    InvalidTable(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Row count and date span of one stored ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub rows: u64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Table of daily bars keyed by `(ticker, date)`.
pub trait PriceStore: Send + Sync {
    /// Newest stored date for `ticker`.
    fn latest_date(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<Option<NaiveDate>, StoreError>> + Send;

    /// Stored bars for `ticker` with `date >= since`, oldest first.
    fn bars_since(
        &self,
        ticker: &str,
        since: NaiveDate,
    ) -> impl Future<Output = Result<Vec<PriceBar>, StoreError>> + Send;

    /// Insert or replace `bars`. Returns the number of rows written.
    fn upsert_bars(
        &self,
        bars: &[PriceBar],
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Delete every row dated strictly before `cutoff`.
    ///
    /// Returns the number of deleted rows when the backend reports it.
    fn delete_before(
        &self,
        cutoff: NaiveDate,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    /// Delete every row belonging to `tickers`.
    fn delete_tickers(
        &self,
        tickers: &[String],
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    /// Tickers that currently have at least one row, sorted.
    fn distinct_tickers(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Per-ticker row counts and date spans, sorted by ticker.
    fn ticker_summaries(
        &self,
    ) -> impl Future<Output = Result<Vec<TickerSummary>, StoreError>> + Send;
}

/// Fold `(ticker, date)` pairs into per-ticker summaries.
pub(crate) fn summarize<I>(rows: I) -> Vec<TickerSummary>
where
    I: IntoIterator<Item = (String, NaiveDate)>,
{
    let mut by_ticker: std::collections::BTreeMap<String, TickerSummary> =
        std::collections::BTreeMap::new();
    for (ticker, date) in rows {
        by_ticker
            .entry(ticker.clone())
            .and_modify(|s| {
                s.rows += 1;
                s.first_date = s.first_date.min(date);
                s.last_date = s.last_date.max(date);
            })
            .or_insert(TickerSummary {
                ticker,
                rows: 1,
                first_date: date,
                last_date: date,
            });
    }
    by_ticker.into_values().collect()
}
