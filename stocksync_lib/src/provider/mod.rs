//! Market-data providers returning daily OHLCV bars.
//!
//! [`BarSource`] is the seam the sync engine fetches through. Yahoo Finance is
//! the primary source; Tiingo keeps history for delisted tickers and is
//! usable on its own or as the secondary of a [`FallbackSource`].

pub mod error;
pub mod tiingo;
pub mod yahoo;

use std::future::Future;

use chrono::NaiveDate;

use crate::bar::RawBar;

pub use error::ProviderError;
pub use tiingo::TiingoClient;
pub use yahoo::YahooClient;

/// A source of historical daily bars.
pub trait BarSource: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch daily bars for `ticker` over the inclusive range `[start, end]`.
    ///
    /// An empty vector means the provider has no data for the range.
    fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<RawBar>, ProviderError>> + Send;
}

/// Asks `primary` first and falls back to `secondary` when it returns no rows.
///
/// Errors from the primary are returned as-is so the retry layer can
/// back off on rate limits instead of hammering the secondary.
pub struct FallbackSource<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackSource<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: BarSource, S: BarSource> BarSource for FallbackSource<P, S> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let bars = self.primary.fetch_daily_bars(ticker, start, end).await?;
        if !bars.is_empty() {
            return Ok(bars);
        }
        tracing::debug!(
            "{} had no data for {} {}..{}, trying {}",
            self.primary.name(),
            ticker,
            start,
            end,
            self.secondary.name()
        );
        self.secondary.fetch_daily_bars(ticker, start, end).await
    }
}
