//! Library layer for stocksync: keeps a table of daily OHLCV bars in step
//! with a market-data provider.
//!
//! Wraps the `tablestore_api` client and the Yahoo/Tiingo providers with a
//! missing-range planner, rate-limited retrying fetches, normalization and
//! deduplication, and a concurrent sync engine that upserts and evicts.

pub mod bar;
pub mod config;
pub mod error;
pub mod planner;
pub mod provider;
pub mod rate_limiter;
pub mod store;
pub mod sync;
pub mod universe;

pub use tablestore_api;

pub use bar::{normalize_bars, PriceBar, RawBar};
pub use config::{ConfigError, Credentials, SyncConfig};
pub use error::SyncError;
pub use planner::{plan_fetch, FetchPlan, PlanMode, RetentionWindow};
pub use provider::{BarSource, FallbackSource, ProviderError, TiingoClient, YahooClient};
pub use rate_limiter::{RateLimiter, RetryPolicy, TrackerSummary};
pub use store::{
    DryRunStore, MemoryStore, PriceStore, RestStore, SqliteStore, StoreError, TickerSummary,
};
pub use sync::{SyncEngine, SyncOptions, SyncReport, TickerOutcome, TickerStatus};
pub use universe::{TickerGroup, Universe, UniverseError};
