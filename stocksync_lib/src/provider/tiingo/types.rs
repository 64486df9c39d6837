//! Response types for Tiingo API.

use serde::Deserialize;

use crate::bar::RawBar;

/// A single daily price record from the Tiingo end-of-day API.
///
/// The response is a JSON array of these records. Unadjusted prices are
/// stored; the adjusted columns are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiingoDailyPrice {
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub adj_close: Option<f64>,
}

impl TiingoDailyPrice {
    /// Convert to a [`RawBar`]. Returns `None` when the date cannot be read.
    ///
    /// Tiingo dates look like `2024-06-14T00:00:00.000Z`; only the calendar
    /// day is kept.
    pub fn to_raw_bar(&self) -> Option<RawBar> {
        let day = self.date.get(..10)?;
        let date = chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
        Some(RawBar {
            date,
            open: self.open.unwrap_or(f64::NAN),
            high: self.high.unwrap_or(f64::NAN),
            low: self.low.unwrap_or(f64::NAN),
            close: self.close.unwrap_or(f64::NAN),
            volume: self.volume,
        })
    }
}
