//! In-memory bar store backed by `DashMap` for concurrent access.

use chrono::NaiveDate;
use dashmap::DashMap;

use crate::bar::{BarKey, PriceBar};
use crate::store::{summarize, PriceStore, StoreError, TickerSummary};

/// Thread-safe in-memory [`PriceStore`].
///
/// Rows are keyed by `(ticker, date)` exactly like the remote table, so an
/// upsert of an existing key replaces the row.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<BarKey, PriceBar>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `bars`.
    pub fn with_bars(bars: impl IntoIterator<Item = PriceBar>) -> Self {
        let store = Self::new();
        for bar in bars {
            store.rows.insert(bar.key(), bar);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every stored row sorted by `(ticker, date)`.
    pub fn snapshot(&self) -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = self.rows.iter().map(|e| e.value().clone()).collect();
        bars.sort_by(|a, b| (&a.ticker, a.date).cmp(&(&b.ticker, b.date)));
        bars
    }
}

impl PriceStore for MemoryStore {
    async fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|e| e.key().0 == ticker)
            .map(|e| e.key().1)
            .max())
    }

    async fn bars_since(&self, ticker: &str, since: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        let mut bars: Vec<PriceBar> = self
            .rows
            .iter()
            .filter(|e| e.key().0 == ticker && e.key().1 >= since)
            .map(|e| e.value().clone())
            .collect();
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    async fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        for bar in bars {
            self.rows.insert(bar.key(), bar.clone());
        }
        Ok(bars.len())
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<Option<u64>, StoreError> {
        let before = self.rows.len();
        self.rows.retain(|key, _| key.1 >= cutoff);
        Ok(Some((before - self.rows.len()) as u64))
    }

    async fn delete_tickers(&self, tickers: &[String]) -> Result<Option<u64>, StoreError> {
        let before = self.rows.len();
        self.rows.retain(|key, _| !tickers.contains(&key.0));
        Ok(Some((before - self.rows.len()) as u64))
    }

    async fn distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut tickers: Vec<String> = self.rows.iter().map(|e| e.key().0.clone()).collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    async fn ticker_summaries(&self) -> Result<Vec<TickerSummary>, StoreError> {
        Ok(summarize(self.rows.iter().map(|e| e.key().clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(ticker: &str, date: NaiveDate, close: i64) -> PriceBar {
        PriceBar {
            ticker: ticker.to_string(),
            date,
            open: None,
            high: None,
            low: None,
            close: Some(Decimal::from(close)),
            volume: None,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_same_key() {
        let store = MemoryStore::new();
        store.upsert_bars(&[bar("AAPL", d(2024, 6, 3), 1)]).await.unwrap();
        store.upsert_bars(&[bar("AAPL", d(2024, 6, 3), 2)]).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].close, Some(Decimal::from(2)));
    }

    #[tokio::test]
    async fn latest_date_per_ticker() {
        let store = MemoryStore::with_bars(vec![
            bar("AAPL", d(2024, 6, 3), 1),
            bar("AAPL", d(2024, 6, 5), 1),
            bar("MSFT", d(2024, 6, 7), 1),
        ]);
        assert_eq!(store.latest_date("AAPL").await.unwrap(), Some(d(2024, 6, 5)));
        assert_eq!(store.latest_date("TSLA").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_before_keeps_cutoff_day() {
        let store = MemoryStore::with_bars(vec![
            bar("AAPL", d(2020, 1, 2), 1),
            bar("AAPL", d(2020, 1, 3), 1),
            bar("MSFT", d(2019, 6, 3), 1),
        ]);
        let deleted = store.delete_before(d(2020, 1, 3)).await.unwrap();
        assert_eq!(deleted, Some(2));
        assert_eq!(store.snapshot(), vec![bar("AAPL", d(2020, 1, 3), 1)]);
    }

    #[tokio::test]
    async fn delete_tickers_and_distinct() {
        let store = MemoryStore::with_bars(vec![
            bar("MSFT", d(2024, 6, 3), 1),
            bar("AAPL", d(2024, 6, 3), 1),
            bar("AAPL", d(2024, 6, 4), 1),
            bar("ATVI", d(2023, 10, 12), 1),
        ]);
        assert_eq!(
            store.distinct_tickers().await.unwrap(),
            vec!["AAPL".to_string(), "ATVI".to_string(), "MSFT".to_string()]
        );
        let deleted = store.delete_tickers(&["ATVI".to_string()]).await.unwrap();
        assert_eq!(deleted, Some(1));
        let summaries = store.ticker_summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].rows, 2);
    }

    #[tokio::test]
    async fn bars_since_sorted() {
        let store = MemoryStore::with_bars(vec![
            bar("AAPL", d(2024, 6, 5), 3),
            bar("AAPL", d(2024, 6, 3), 1),
            bar("AAPL", d(2024, 6, 4), 2),
        ]);
        let bars = store.bars_since("AAPL", d(2024, 6, 4)).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(2024, 6, 4));
    }
}
