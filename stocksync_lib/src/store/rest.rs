//! Remote bar table served over the PostgREST dialect.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tablestore_api::{Client, DeleteQuery, Query, SelectQuery, SortDirection};

use crate::bar::PriceBar;
use crate::store::sqlite::validate_table_name;
use crate::store::{PriceStore, StoreError, TickerSummary};

/// Default table holding daily bars.
pub const DEFAULT_TABLE: &str = "stock_data";

/// Rows per page when reading; matches the server's default max-rows.
const PAGE_SIZE: u64 = 1000;

const CONFLICT_COLUMNS: [&str; 2] = ["ticker", "date"];

#[derive(Deserialize)]
struct DateRow {
    date: NaiveDate,
}

#[derive(Deserialize)]
struct TickerRow {
    ticker: String,
}

/// [`PriceStore`] over a remote table reached through [`tablestore_api::Client`].
pub struct RestStore {
    client: Client,
    table: String,
    page_size: u64,
}

impl RestStore {
    pub fn new(client: Client, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            client,
            table: table.to_string(),
            page_size: PAGE_SIZE,
        })
    }

    /// Override the read page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Read every row matching `query`, one page at a time, until a page
    /// comes back empty. The server may cap a page below `page_size`, so a
    /// short page does not mean the end.
    ///
    /// `query` must carry a total order so pages do not overlap.
    async fn select_all<T: DeserializeOwned>(&self, query: SelectQuery) -> Result<Vec<T>, StoreError> {
        let mut rows = Vec::new();
        let mut offset = 0u64;
        loop {
            let page_query = query
                .clone()
                .with_limit(self.page_size)
                .with_offset(offset);
            let page: Vec<T> = self.client.select(&self.table, &page_query).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;
            rows.extend(page);
        }
        Ok(rows)
    }

    /// Oldest or newest stored date of `ticker`.
    async fn edge_date(
        &self,
        ticker: &str,
        direction: SortDirection,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let query = SelectQuery::columns(["date"])
            .eq("ticker", ticker)
            .with_order("date", direction)
            .with_limit(1);
        let rows: Vec<DateRow> = self.client.select(&self.table, &query).await?;
        Ok(rows.into_iter().next().map(|r| r.date))
    }

    /// Row count of `ticker`, paging through its dates when the server
    /// does not report a total.
    async fn row_count(&self, ticker: &str) -> Result<u64, StoreError> {
        let query = SelectQuery::columns(["date"]).eq("ticker", ticker);
        if let Some(total) = self.client.count(&self.table, &query).await? {
            return Ok(total);
        }
        let rows: Vec<DateRow> = self
            .select_all(query.with_order("date", SortDirection::Asc))
            .await?;
        Ok(rows.len() as u64)
    }
}

impl PriceStore for RestStore {
    async fn latest_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.edge_date(ticker, SortDirection::Desc).await
    }

    async fn bars_since(&self, ticker: &str, since: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        let query = SelectQuery::default()
            .eq("ticker", ticker)
            .gte("date", since)
            .with_order("date", SortDirection::Asc);
        self.select_all(query).await
    }

    async fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        self.client
            .upsert(&self.table, bars, &CONFLICT_COLUMNS)
            .await?;
        Ok(bars.len())
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<Option<u64>, StoreError> {
        let query = DeleteQuery::default().lt("date", cutoff);
        Ok(self.client.delete(&self.table, &query).await?)
    }

    async fn delete_tickers(&self, tickers: &[String]) -> Result<Option<u64>, StoreError> {
        if tickers.is_empty() {
            return Ok(Some(0));
        }
        let query = DeleteQuery::default().is_in("ticker", tickers);
        Ok(self.client.delete(&self.table, &query).await?)
    }

    /// Skip scan over the `(ticker, date)` key: one single-row request per
    /// distinct ticker instead of reading every bar.
    async fn distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut tickers: Vec<String> = Vec::new();
        loop {
            let mut query = SelectQuery::columns(["ticker"])
                .with_order("ticker", SortDirection::Asc)
                .with_limit(1);
            if let Some(last) = tickers.last() {
                query = query.gt("ticker", last);
            }
            let rows: Vec<TickerRow> = self.client.select(&self.table, &query).await?;
            match rows.into_iter().next() {
                Some(row) => tickers.push(row.ticker),
                None => break,
            }
        }
        Ok(tickers)
    }

    /// Three small requests per ticker (oldest date, newest date, row count).
    async fn ticker_summaries(&self) -> Result<Vec<TickerSummary>, StoreError> {
        let mut summaries = Vec::new();
        for ticker in self.distinct_tickers().await? {
            let first = self.edge_date(&ticker, SortDirection::Asc).await?;
            let last = self.edge_date(&ticker, SortDirection::Desc).await?;
            let (Some(first_date), Some(last_date)) = (first, last) else {
                // Deleted between the scan and this read.
                continue;
            };
            let rows = self.row_count(&ticker).await?;
            summaries.push(TickerSummary {
                ticker,
                rows,
                first_date,
                last_date,
            });
        }
        Ok(summaries)
    }
}
