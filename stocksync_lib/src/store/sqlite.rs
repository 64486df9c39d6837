//! SQLite storage for daily bars.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::bar::PriceBar;
use crate::store::{PriceStore, StoreError, TickerSummary};

const DATE_FORMAT: &str = "%Y-%m-%d";

type RawRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

/// Bars stored in a local SQLite table keyed by `(ticker, date)`.
///
/// Prices are kept as decimal text so values round-trip exactly.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::with_connection(conn, table)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.migrate_v1(&conn)?;
            conn.pragma_update(None, "user_version", 1)?;
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                open TEXT,
                high TEXT,
                low TEXT,
                close TEXT,
                volume INTEGER,
                updated_at TEXT,
                PRIMARY KEY (ticker, date)
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_date ON {t}(date);",
            t = self.table
        ))?;

        Ok(())
    }

    /// Tables created before `updated_at` existed get the column added.
    fn migrate_v1(&self, conn: &Connection) -> Result<(), StoreError> {
        let sql = format!("ALTER TABLE {} ADD COLUMN updated_at TEXT", self.table);
        match conn.execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("duplicate column name") || msg.contains("no such table") =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn query_bars(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<PriceBar>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<Result<Vec<RawRow>, _>>()?;
        rows.into_iter().map(row_to_bar).collect()
    }
}

pub(crate) fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .map_err(|e| StoreError::InvalidTable(e.to_string()))?;
    if re.is_match(table) {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StoreError::CorruptRow(format!("bad date {:?}: {}", value, e)))
}

fn parse_price(value: Option<String>) -> Result<Option<Decimal>, StoreError> {
    value
        .map(|v| {
            Decimal::from_str(&v)
                .map_err(|e| StoreError::CorruptRow(format!("bad price {:?}: {}", v, e)))
        })
        .transpose()
}

fn row_to_bar(row: RawRow) -> Result<PriceBar, StoreError> {
    let (ticker, date, open, high, low, close, volume) = row;
    Ok(PriceBar {
        ticker,
        date: parse_date(&date)?,
        open: parse_price(open)?,
        high: parse_price(high)?,
        low: parse_price(low)?,
        close: parse_price(close)?,
        volume,
    })
}

impl PriceStore for SqliteStore {
    async fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        let conn = self.conn();
        let latest: Option<String> = conn.query_row(
            &format!("SELECT MAX(date) FROM {} WHERE ticker = ?1", self.table),
            params![ticker],
            |row| row.get(0),
        )?;
        latest.as_deref().map(parse_date).transpose()
    }

    async fn bars_since(&self, ticker: &str, since: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        let sql = format!(
            "SELECT ticker, date, open, high, low, close, volume FROM {}
             WHERE ticker = ?1 AND date >= ?2
             ORDER BY date",
            self.table
        );
        let since = since.format(DATE_FORMAT).to_string();
        self.query_bars(&sql, params![ticker, since])
    }

    async fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (ticker, date, open, high, low, close, volume, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(ticker, date) DO UPDATE SET
                   open = excluded.open,
                   high = excluded.high,
                   low = excluded.low,
                   close = excluded.close,
                   volume = excluded.volume,
                   updated_at = excluded.updated_at",
                self.table
            ))?;

            for bar in bars {
                stmt.execute(params![
                    bar.ticker,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open.map(|d| d.to_string()),
                    bar.high.map(|d| d.to_string()),
                    bar.low.map(|d| d.to_string()),
                    bar.close.map(|d| d.to_string()),
                    bar.volume,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(bars.len())
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<Option<u64>, StoreError> {
        let conn = self.conn();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE date < ?1", self.table),
            params![cutoff.format(DATE_FORMAT).to_string()],
        )?;
        Ok(Some(deleted as u64))
    }

    async fn delete_tickers(&self, tickers: &[String]) -> Result<Option<u64>, StoreError> {
        if tickers.is_empty() {
            return Ok(Some(0));
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0u64;
        {
            let mut stmt = tx.prepare(&format!("DELETE FROM {} WHERE ticker = ?1", self.table))?;
            for ticker in tickers {
                deleted += stmt.execute(params![ticker])? as u64;
            }
        }
        tx.commit()?;
        Ok(Some(deleted))
    }

    async fn distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT ticker FROM {} ORDER BY ticker",
            self.table
        ))?;
        let tickers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    async fn ticker_summaries(&self) -> Result<Vec<TickerSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT ticker, COUNT(*), MIN(date), MAX(date) FROM {}
             GROUP BY ticker ORDER BY ticker",
            self.table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(ticker, rows, first, last)| {
                Ok(TickerSummary {
                    ticker,
                    rows: rows.max(0) as u64,
                    first_date: parse_date(&first)?,
                    last_date: parse_date(&last)?,
                })
            })
            .collect()
    }
}
