//! Tiingo API client for fetching historical end-of-day bars.
//!
//! Used as a secondary source when Yahoo Finance returns no data for
//! delisted/acquired tickers. Tiingo retains historical data for tickers
//! that have been delisted.

use super::types::TiingoDailyPrice;
use crate::bar::RawBar;
use crate::provider::{BarSource, ProviderError};
use chrono::NaiveDate;
use std::time::Duration;

/// Request timeout for Tiingo API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const NAME: &str = "tiingo";

/// Tiingo REST API client for end-of-day historical prices.
pub struct TiingoClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TiingoClient {
    /// Create a new TiingoClient with default base URL.
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url("https://api.tiingo.com", api_key)
    }

    /// Create a new TiingoClient with custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: &str, api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get daily bars for `ticker` between `start` and `end`, both inclusive.
    ///
    /// Returns an empty vector if the ticker is unknown (404) or there is no
    /// data in the range (empty array).
    ///
    /// Tiingo quirk: rate limits may return HTTP 200 with Content-Type
    /// text/plain instead of a proper 429 status code.
    pub async fn get_daily_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TiingoDailyPrice>, ProviderError> {
        let url = format!("{}/tiingo/daily/{}/prices", self.base_url, ticker);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .query(&[
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("endDate", end.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await?;

        let status = response.status();

        // 404 = ticker not found on Tiingo
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::InvalidApiKey(NAME));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(NAME));
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: snippet(&body, 200).to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = response.text().await.map_err(|e| {
            ProviderError::ParseFailed(format!("Failed to read response body: {}", e))
        })?;

        if content_type.contains("text/plain") || content_type.contains("text/html") {
            let lower = body.to_lowercase();
            if lower.contains("rate limit") || lower.contains("too many requests") {
                return Err(ProviderError::RateLimited(NAME));
            }
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::ParseFailed(format!(
                "Failed to deserialize response: {} | body: {}",
                e,
                snippet(&body, 500)
            ))
        })
    }
}

impl BarSource for TiingoClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let prices = self.get_daily_prices(ticker, start, end).await?;
        let bars: Vec<RawBar> = prices.iter().filter_map(|p| p.to_raw_bar()).collect();
        if bars.len() < prices.len() {
            tracing::warn!(
                "Tiingo returned {} rows with unreadable dates for {}",
                prices.len() - bars.len(),
                ticker
            );
        }
        Ok(bars)
    }
}

fn snippet(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
