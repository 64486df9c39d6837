//! Sync configuration.
//!
//! Settings come from an optional TOML file, then `STOCKSYNC_*` environment
//! overrides; the CLI applies its flags last. Credentials are read from the
//! environment only and never appear in `Debug` output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::{RetentionWindow, DEFAULT_RETENTION_DAYS};
use crate::rate_limiter::{RateLimiter, RetryPolicy};
use crate::store::rest::DEFAULT_TABLE;
use crate::sync::SyncOptions;

/// Longest accepted retention: a century of daily bars.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Table holding the bars.
    pub table: String,
    pub retention_days: u32,
    pub concurrency: usize,
    pub upsert_batch_size: usize,
    /// Provider request budget per rolling minute.
    pub requests_per_minute: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub circuit_breaker_threshold: usize,
    pub refresh_latest: bool,
    pub prune_removed: bool,
    pub evict: bool,
    /// Universe file; the embedded universe is used when unset.
    pub universe: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        let retry = RetryPolicy::default();
        Self {
            table: DEFAULT_TABLE.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            concurrency: options.concurrency,
            upsert_batch_size: options.upsert_batch_size,
            requests_per_minute: 60,
            max_retries: retry.max_retries,
            retry_base_ms: retry.base_backoff.as_millis() as u64,
            retry_max_ms: retry.max_backoff.as_millis() as u64,
            circuit_breaker_threshold: options.circuit_breaker_threshold,
            refresh_latest: options.refresh_latest,
            prune_removed: options.prune_removed,
            evict: options.evict,
            universe: None,
        }
    }
}

impl SyncConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// File (if given) plus process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `STOCKSYNC_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table) = lookup("STOCKSYNC_TABLE") {
            self.table = table;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_RETENTION_DAYS")? {
            self.retention_days = v;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_CONCURRENCY")? {
            self.concurrency = v;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_RETRY_MAX")? {
            self.max_retries = v;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_RETRY_BASE_MS")? {
            self.retry_base_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_REQUESTS_PER_MINUTE")? {
            self.requests_per_minute = v;
        }
        if let Some(v) = parse_env(&lookup, "STOCKSYNC_UPSERT_BATCH")? {
            self.upsert_batch_size = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.upsert_batch_size == 0 {
            return Err(ConfigError::Invalid("upsert_batch_size must be at least 1".into()));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::Invalid("retention_days must be at least 1".into()));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Invalid(format!(
                "retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        if self.requests_per_minute == 0 {
            return Err(ConfigError::Invalid("requests_per_minute must be at least 1".into()));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker_threshold must be at least 1".into(),
            ));
        }
        if self.retry_max_ms < self.retry_base_ms {
            return Err(ConfigError::Invalid(
                "retry_max_ms must not be below retry_base_ms".into(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".into()));
        }
        Ok(())
    }

    pub fn retention(&self) -> RetentionWindow {
        RetentionWindow::new(self.retention_days)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.retry_base_ms),
            max_backoff: Duration::from_millis(self.retry_max_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::per_minute(self.requests_per_minute)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            retention: self.retention(),
            refresh_latest: self.refresh_latest,
            concurrency: self.concurrency,
            upsert_batch_size: self.upsert_batch_size,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            prune_removed: self.prune_removed,
            evict: self.evict,
            ..SyncOptions::default()
        }
    }
}

fn parse_env<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}

/// Secrets read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub table_url: Option<String>,
    pub table_key: Option<String>,
    pub tiingo_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            table_url: non_empty("SUPABASE_URL"),
            table_key: non_empty("SUPABASE_KEY"),
            tiingo_api_key: non_empty("TIINGO_API_KEY"),
        }
    }

    /// URL and key of the remote table store.
    pub fn table_store(&self) -> Result<(&str, &str), ConfigError> {
        let url = self
            .table_url
            .as_deref()
            .ok_or(ConfigError::MissingCredential("SUPABASE_URL"))?;
        let key = self
            .table_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("SUPABASE_KEY"))?;
        Ok((url, key))
    }

    pub fn tiingo(&self) -> Result<&str, ConfigError> {
        self.tiingo_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("TIINGO_API_KEY"))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("table_url", &self.table_url)
            .field("table_key", &redact(&self.table_key))
            .field("tiingo_api_key", &redact(&self.tiingo_api_key))
            .finish()
    }
}
