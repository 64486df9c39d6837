//! Error types shared by every market-data provider.

use thiserror::Error;

/// Errors from market-data provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Rate limited by {0}")]
    RateLimited(&'static str),
    #[error("Invalid API key for {0}")]
    InvalidApiKey(&'static str),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    ParseFailed(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl ProviderError {
    /// Whether another attempt may succeed after backing off.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Network(_) => true,
            ProviderError::Upstream(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::InvalidApiKey(_)
            | ProviderError::InvalidDate(_)
            | ProviderError::ParseFailed(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
            || matches!(self, ProviderError::Http { status: 429, .. })
    }
}
