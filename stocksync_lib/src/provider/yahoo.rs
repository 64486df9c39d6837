//! Yahoo Finance client wrapper for fetching daily bars.
//!
//! Provides YahooClient, a [`BarSource`] over `yahoo_finance_api`, plus the
//! chrono/time date conversions the upstream crate requires.

use chrono::{Duration, NaiveDate};
use time::OffsetDateTime;

use crate::bar::RawBar;
use crate::provider::{BarSource, ProviderError};

const NAME: &str = "yahoo";

/// Convert chrono::NaiveDate to time::OffsetDateTime at UTC midnight.
pub fn date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, ProviderError> {
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ProviderError::InvalidDate(date.to_string()))?;

    let timestamp = datetime.and_utc().timestamp();

    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|_| ProviderError::InvalidDate(date.to_string()))
}

/// Convert a unix timestamp (seconds) to its UTC calendar day.
pub fn timestamp_to_date(timestamp: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

/// Trading day of a quote stamped `timestamp`, on an exchange `gmtoffset`
/// seconds east of UTC.
pub fn quote_date(timestamp: i64, gmtoffset: i32) -> Option<NaiveDate> {
    timestamp_to_date(timestamp.checked_add(i64::from(gmtoffset))?)
}

/// Classify an upstream failure. "No data" style errors are not failures
/// for a sync: the ticker simply has no bars in the range.
fn classify(err: yahoo_finance_api::YahooError) -> Result<Vec<RawBar>, ProviderError> {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("too many requests") {
        return Err(ProviderError::RateLimited(NAME));
    }
    if lower.contains("empty")
        || lower.contains("no quotes")
        || lower.contains("no result")
        || lower.contains("not found")
    {
        return Ok(Vec::new());
    }
    Err(ProviderError::Upstream(message))
}

/// Yahoo Finance client.
pub struct YahooClient {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooClient {
    /// Create a new YahooClient with default configuration.
    pub fn new() -> Result<Self, ProviderError> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        Ok(Self { connector })
    }
}

impl BarSource for YahooClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let from = date_to_offset_datetime(start)?;
        // Upstream treats the end bound as exclusive.
        let to = date_to_offset_datetime(end + Duration::days(1))?;

        let response = match self.connector.get_quote_history(ticker, from, to).await {
            Ok(resp) => resp,
            Err(err) => return classify(err),
        };
        // Unknown offset falls back to UTC days.
        let gmtoffset = response.metadata().map_or(0, |meta| meta.gmtoffset);
        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(err) => return classify(err),
        };

        let bars = quotes
            .into_iter()
            .filter_map(|q| {
                let date = quote_date(q.timestamp as i64, gmtoffset)?;
                Some(RawBar {
                    date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: i64::try_from(q.volume).ok(),
                })
            })
            .collect();
        Ok(bars)
    }
}
