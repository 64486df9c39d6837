//! Ticker universe: the set of symbols a sync pass keeps up to date.
//!
//! A universe is a list of named groups loaded from YAML, from a JSON array
//! of symbols, or from the default embedded at compile time (same
//! `include_str!` pattern the seed data uses).

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bar::canonical_ticker;

const TICKER_PATTERN: &str = r"^[A-Z0-9^][A-Z0-9.\-=^]{0,19}$";

#[derive(Error, Debug)]
pub enum UniverseError {
    #[error("Failed to read universe file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse universe YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Failed to parse universe JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid ticker symbol: {0:?}")]
    InvalidTicker(String),
    #[error("Unknown ticker group: {0}")]
    UnknownGroup(String),
    #[error("Universe contains no tickers")]
    Empty,
}

/// A named list of tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerGroup {
    pub name: String,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    pub groups: Vec<TickerGroup>,
}

impl Universe {
    /// Parse and validate a YAML universe (`groups: [{name, tickers}]`).
    pub fn from_yaml(yaml_content: &str) -> Result<Self, UniverseError> {
        let universe: Universe = serde_yml::from_str(yaml_content)?;
        universe.validated()
    }

    /// Parse a JSON array of tickers into a single group called `name`.
    pub fn from_json_array(name: &str, json_content: &str) -> Result<Self, UniverseError> {
        let tickers: Vec<String> = serde_json::from_str(json_content)?;
        Self::from_tickers(name, tickers)
    }

    /// Build a one-group universe from an explicit ticker list.
    pub fn from_tickers<I, S>(name: &str, tickers: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Universe {
            groups: vec![TickerGroup {
                name: name.to_string(),
                tickers: tickers.into_iter().map(|t| t.as_ref().to_string()).collect(),
            }],
        }
        .validated()
    }

    /// Load a universe file. `.json` files hold a plain array of tickers and
    /// become one group named after the file stem; anything else is YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UniverseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("universe");
            Self::from_json_array(name, &content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// The universe embedded in the binary.
    pub fn embedded() -> Result<Self, UniverseError> {
        let yaml_content = include_str!("../../seed_data/universe.yml");
        Self::from_yaml(yaml_content)
    }

    /// All tickers across groups, in group order, without duplicates.
    pub fn tickers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.tickers.iter())
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }

    /// Restrict the universe to a single group (case-insensitive).
    pub fn group(&self, name: &str) -> Result<Universe, UniverseError> {
        self.groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .map(|g| Universe {
                groups: vec![g.clone()],
            })
            .ok_or_else(|| UniverseError::UnknownGroup(name.to_string()))
    }

    /// Canonicalize every ticker and reject malformed ones.
    fn validated(mut self) -> Result<Self, UniverseError> {
        let re = Regex::new(TICKER_PATTERN).map_err(|_| UniverseError::InvalidTicker(String::new()))?;
        for group in &mut self.groups {
            for ticker in &mut group.tickers {
                let canonical = canonical_ticker(ticker);
                if !re.is_match(&canonical) {
                    return Err(UniverseError::InvalidTicker(ticker.clone()));
                }
                *ticker = canonical;
            }
        }
        if self.groups.iter().all(|g| g.tickers.is_empty()) {
            return Err(UniverseError::Empty);
        }
        Ok(self)
    }
}

/// Check a single ticker symbol, returning its canonical form.
pub fn validate_ticker(ticker: &str) -> Result<String, UniverseError> {
    let universe = Universe::from_tickers("single", [ticker])?;
    Ok(universe.tickers().remove(0))
}
