//! CLI subcommand implementations.

pub mod prune;
pub mod status;
pub mod sync;
pub mod tickers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use stocksync_lib::{SyncConfig, Universe};

/// Which tickers a command works on.
#[derive(Args, Debug, Clone, Default)]
pub struct UniverseArgs {
    /// Universe file (YAML groups or a JSON array of tickers)
    #[arg(long)]
    pub universe: Option<PathBuf>,

    /// Only use this group of the universe
    #[arg(long)]
    pub group: Option<String>,

    /// Explicit tickers, comma-separated (overrides --universe)
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,
}

impl UniverseArgs {
    /// Resolve the universe to work on: the tracked universe narrowed by `--group`.
    pub fn resolve(&self, config: &SyncConfig) -> Result<Universe> {
        let universe = self.tracked(config)?;
        match &self.group {
            Some(name) => Ok(universe.group(name)?),
            None => Ok(universe),
        }
    }

    /// Every tracked ticker: `--tickers`, then `--universe`, then the config
    /// file's `universe`, then the embedded default. `--group` is ignored, so
    /// removed-ticker pruning never touches a group that was merely not selected.
    pub fn tracked(&self, config: &SyncConfig) -> Result<Universe> {
        if !self.tickers.is_empty() {
            Ok(Universe::from_tickers("cli", &self.tickers)?)
        } else if let Some(path) = self.universe.as_ref().or(config.universe.as_ref()) {
            Universe::from_path(path)
                .with_context(|| format!("loading universe from {}", path.display()))
        } else {
            Ok(Universe::embedded()?)
        }
    }
}

/// `--today` when given, otherwise the current UTC date.
pub fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Utc::now().date_naive())
}
