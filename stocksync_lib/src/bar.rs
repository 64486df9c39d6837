//! Daily price bar records and the normalization applied to provider output.
//!
//! A [`PriceBar`] is keyed by `(ticker, date)`. Providers hand back
//! [`RawBar`]s with floating point prices; [`normalize_bars`] turns those into
//! storable records and [`dedupe_against_existing`] strips rows the store
//! already holds verbatim.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept when converting provider floats.
const PRICE_SCALE: u32 = 6;

/// Unique key of a stored bar.
pub type BarKey = (String, NaiveDate);

/// One OHLCV row as persisted in the `stock_data` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<i64>,
}

impl PriceBar {
    pub fn key(&self) -> BarKey {
        (self.ticker.clone(), self.date)
    }

    fn has_any_price(&self) -> bool {
        self.open.is_some() || self.high.is_some() || self.low.is_some() || self.close.is_some()
    }
}

/// Provider-neutral bar before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
}

/// Canonical ticker form used as the store key.
pub fn canonical_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// Convert a provider float to a decimal price. NaN and infinities become `None`.
pub fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_SCALE).normalize())
}

/// Normalize raw provider bars for `ticker` over the inclusive range `[start, end]`.
///
/// Rows outside the range and rows without any price are dropped. When the
/// provider repeats a date the last occurrence wins. Output is sorted by date.
pub fn normalize_bars(
    ticker: &str,
    raw: Vec<RawBar>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PriceBar> {
    let ticker = canonical_ticker(ticker);
    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();

    for bar in raw {
        if bar.date < start || bar.date > end {
            continue;
        }
        let record = PriceBar {
            ticker: ticker.clone(),
            date: bar.date,
            open: to_price(bar.open),
            high: to_price(bar.high),
            low: to_price(bar.low),
            close: to_price(bar.close),
            volume: bar.volume.filter(|v| *v >= 0),
        };
        if !record.has_any_price() {
            continue;
        }
        by_date.insert(bar.date, record);
    }

    by_date.into_values().collect()
}

/// Drop fetched bars that are identical to what the store already holds.
///
/// Returns the bars that still need writing and the number skipped as unchanged.
pub fn dedupe_against_existing(
    fetched: Vec<PriceBar>,
    existing: &[PriceBar],
) -> (Vec<PriceBar>, usize) {
    let stored: HashMap<BarKey, &PriceBar> = existing.iter().map(|b| (b.key(), b)).collect();
    let before = fetched.len();
    let changed: Vec<PriceBar> = fetched
        .into_iter()
        .filter(|bar| stored.get(&bar.key()).map_or(true, |old| *old != bar))
        .collect();
    let unchanged = before - changed.len();
    (changed, unchanged)
}
