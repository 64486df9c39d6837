//! Missing-range computation for a single ticker.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Default retention: five years of 365 days.
pub const DEFAULT_RETENTION_DAYS: u32 = 5 * 365;

/// Trailing span of history that is kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub days: u32,
}

impl RetentionWindow {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// First date that is still retained. Rows strictly before it are evicted.
    /// Saturates at the earliest representable date.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

/// How much of the window to (re)fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanMode {
    /// Fetch only what is missing after the newest stored day.
    #[default]
    Incremental,
    /// Re-fetch the whole retention window regardless of stored rows.
    Full,
}

/// Outcome of planning one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Fetch the inclusive range `[start, end]`.
    Range { start: NaiveDate, end: NaiveDate },
    /// Nothing to fetch.
    UpToDate,
}

/// Compute the range to fetch for a ticker whose newest stored bar is `latest`.
///
/// With `refresh_latest` the newest stored day is fetched again so a bar
/// captured mid-session is replaced by the settled one.
pub fn plan_fetch(
    latest: Option<NaiveDate>,
    today: NaiveDate,
    window: RetentionWindow,
    mode: PlanMode,
    refresh_latest: bool,
) -> FetchPlan {
    let cutoff = window.cutoff(today);

    let start = match (mode, latest) {
        (PlanMode::Full, _) | (PlanMode::Incremental, None) => cutoff,
        (PlanMode::Incremental, Some(last)) => {
            let next = if refresh_latest {
                last
            } else {
                last + Duration::days(1)
            };
            next.max(cutoff)
        }
    };

    if start > today || !contains_weekday(start, today) {
        return FetchPlan::UpToDate;
    }

    FetchPlan::Range { start, end: today }
}

/// Whether the inclusive range holds at least one Monday-Friday date.
pub fn contains_weekday(start: NaiveDate, end: NaiveDate) -> bool {
    if start > end {
        return false;
    }
    // Any span of five or more days always contains a weekday.
    if (end - start).num_days() >= 4 {
        return true;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .any(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // 2024-06-12 is a Wednesday.
    const YEAR: RetentionWindow = RetentionWindow { days: 365 };

    #[test]
    fn test_cutoff_saturates_for_huge_window() {
        let today = d(2024, 6, 14);
        assert_eq!(RetentionWindow::new(u32::MAX).cutoff(today), NaiveDate::MIN);
        assert_eq!(RetentionWindow::new(10).cutoff(today), d(2024, 6, 4));
    }

    #[test]
    fn test_new_ticker_backfills_window() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(None, today, YEAR, PlanMode::Incremental, true);
        assert_eq!(
            plan,
            FetchPlan::Range {
                start: d(2023, 6, 13),
                end: today
            }
        );
    }

    #[test]
    fn test_incremental_refreshes_latest_day() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(Some(d(2024, 6, 10)), today, YEAR, PlanMode::Incremental, true);
        assert_eq!(
            plan,
            FetchPlan::Range {
                start: d(2024, 6, 10),
                end: today
            }
        );
    }

    #[test]
    fn test_incremental_without_refresh_starts_next_day() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(Some(d(2024, 6, 10)), today, YEAR, PlanMode::Incremental, false);
        assert_eq!(
            plan,
            FetchPlan::Range {
                start: d(2024, 6, 11),
                end: today
            }
        );
    }

    #[test]
    fn test_up_to_date_when_latest_is_today_without_refresh() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(Some(today), today, YEAR, PlanMode::Incremental, false);
        assert_eq!(plan, FetchPlan::UpToDate);
    }

    #[test]
    fn test_weekend_only_gap_is_up_to_date() {
        // Friday stored, today is Sunday.
        let today = d(2024, 6, 16);
        let plan = plan_fetch(Some(d(2024, 6, 14)), today, YEAR, PlanMode::Incremental, false);
        assert_eq!(plan, FetchPlan::UpToDate);
    }

    #[test]
    fn test_stale_latest_clamped_to_cutoff() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(Some(d(2020, 1, 2)), today, YEAR, PlanMode::Incremental, true);
        assert_eq!(
            plan,
            FetchPlan::Range {
                start: YEAR.cutoff(today),
                end: today
            }
        );
    }

    #[test]
    fn test_full_mode_ignores_latest() {
        let today = d(2024, 6, 12);
        let plan = plan_fetch(Some(d(2024, 6, 11)), today, YEAR, PlanMode::Full, true);
        assert_eq!(
            plan,
            FetchPlan::Range {
                start: d(2023, 6, 13),
                end: today
            }
        );
    }

    #[test]
    fn test_default_retention_is_five_years() {
        let window = RetentionWindow::default();
        assert_eq!(window.days, 1825);
        assert_eq!(window.cutoff(d(2025, 1, 1)), d(2020, 1, 3));
    }

    #[test]
    fn test_contains_weekday() {
        assert!(!contains_weekday(d(2024, 6, 15), d(2024, 6, 16)));
        assert!(contains_weekday(d(2024, 6, 15), d(2024, 6, 17)));
        assert!(contains_weekday(d(2024, 6, 1), d(2024, 6, 30)));
        assert!(!contains_weekday(d(2024, 6, 17), d(2024, 6, 16)));
    }
}
