//! Runtime selection of the store and provider behind a command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use stocksync_lib::bar::{PriceBar, RawBar};
use stocksync_lib::tablestore_api::Client;
use stocksync_lib::{
    BarSource, Credentials, FallbackSource, PriceStore, ProviderError, RestStore, SqliteStore,
    StoreError, SyncConfig, TickerSummary, TiingoClient, YahooClient,
};

/// Where bars are stored.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Use a local SQLite database instead of the remote table store
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Table name (overrides config and STOCKSYNC_TABLE)
    #[arg(long)]
    pub table: Option<String>,
}

/// Either backing store. [`PriceStore`] is not object safe, so dispatch is by enum.
pub enum Backend {
    Rest(RestStore),
    Sqlite(SqliteStore),
}

impl Backend {
    /// SQLite when `--db` is given, otherwise the remote table store from
    /// `SUPABASE_URL` / `SUPABASE_KEY`.
    pub fn open(args: &StoreArgs, config: &SyncConfig, creds: &Credentials) -> Result<Self> {
        let table = args.table.as_deref().unwrap_or(&config.table);
        match &args.db {
            Some(path) => {
                let store = SqliteStore::open(path, table)
                    .with_context(|| format!("opening {}", path.display()))?;
                store.init()?;
                tracing::info!("Using SQLite store {} (table {})", path.display(), table);
                Ok(Self::Sqlite(store))
            }
            None => {
                let (url, key) = creds.table_store()?;
                let client = Client::new(url, key)?;
                tracing::info!("Using remote table store {} (table {})", client.base_url(), table);
                Ok(Self::Rest(RestStore::new(client, table)?))
            }
        }
    }
}

impl PriceStore for Backend {
    async fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        match self {
            Self::Rest(s) => s.latest_date(ticker).await,
            Self::Sqlite(s) => s.latest_date(ticker).await,
        }
    }

    async fn bars_since(&self, ticker: &str, since: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        match self {
            Self::Rest(s) => s.bars_since(ticker, since).await,
            Self::Sqlite(s) => s.bars_since(ticker, since).await,
        }
    }

    async fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        match self {
            Self::Rest(s) => s.upsert_bars(bars).await,
            Self::Sqlite(s) => s.upsert_bars(bars).await,
        }
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<Option<u64>, StoreError> {
        match self {
            Self::Rest(s) => s.delete_before(cutoff).await,
            Self::Sqlite(s) => s.delete_before(cutoff).await,
        }
    }

    async fn delete_tickers(&self, tickers: &[String]) -> Result<Option<u64>, StoreError> {
        match self {
            Self::Rest(s) => s.delete_tickers(tickers).await,
            Self::Sqlite(s) => s.delete_tickers(tickers).await,
        }
    }

    async fn distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Rest(s) => s.distinct_tickers().await,
            Self::Sqlite(s) => s.distinct_tickers().await,
        }
    }

    async fn ticker_summaries(&self) -> Result<Vec<TickerSummary>, StoreError> {
        match self {
            Self::Rest(s) => s.ticker_summaries().await,
            Self::Sqlite(s) => s.ticker_summaries().await,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo,
    Tiingo,
}

/// The configured market-data source.
pub enum Provider {
    Yahoo(YahooClient),
    Tiingo(TiingoClient),
    YahooThenTiingo(FallbackSource<YahooClient, TiingoClient>),
}

impl Provider {
    /// Build the provider. With `tiingo_fallback`, Yahoo misses are retried
    /// on Tiingo (needs `TIINGO_API_KEY`).
    pub fn build(kind: ProviderKind, tiingo_fallback: bool, creds: &Credentials) -> Result<Self> {
        let provider = match (kind, tiingo_fallback) {
            (ProviderKind::Yahoo, false) => Self::Yahoo(YahooClient::new()?),
            (ProviderKind::Yahoo, true) => {
                let tiingo = TiingoClient::new(creds.tiingo()?.to_string())?;
                Self::YahooThenTiingo(FallbackSource::new(YahooClient::new()?, tiingo))
            }
            (ProviderKind::Tiingo, _) => {
                Self::Tiingo(TiingoClient::new(creds.tiingo()?.to_string())?)
            }
        };
        Ok(provider)
    }
}

impl BarSource for Provider {
    fn name(&self) -> &'static str {
        match self {
            Self::Yahoo(p) => p.name(),
            Self::Tiingo(p) => p.name(),
            Self::YahooThenTiingo(p) => p.name(),
        }
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, ProviderError> {
        match self {
            Self::Yahoo(p) => p.fetch_daily_bars(ticker, start, end).await,
            Self::Tiingo(p) => p.fetch_daily_bars(ticker, start, end).await,
            Self::YahooThenTiingo(p) => p.fetch_daily_bars(ticker, start, end).await,
        }
    }
}
