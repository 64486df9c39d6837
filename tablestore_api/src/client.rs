//! HTTP client for the table store REST API.

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::{
    query::{DeleteQuery, Query, SelectQuery},
    Error,
};

/// Request timeout for table store calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a PostgREST table store.
///
/// Every request carries the project API key both as `apikey` and as a
/// bearer token, which is what hosted PostgREST gateways expect.
pub struct Client {
    http: reqwest::Client,
    /// Base URL of the project, without the `/rest/v1` suffix.
    base_url: String,
    api_key: String,
}

impl Client {
    /// Creates a client for the project at `base_url`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::RequestFailed
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// The project base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> Result<Url, Error> {
        Url::parse(format!("{}/rest/v1/{}", self.base_url, table).as_str()).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::InvalidUrl(format!("{}/rest/v1/{}: {}", self.base_url, table, e))
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(HeaderMap, String), Error> {
        let resp = self.authorize(builder).send().await.map_err(|e| {
            tracing::error!("Failed to reach table store: {}", e);
            Error::RequestFailed
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::RequestFailed
        })?;

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        Ok((headers, body))
    }

    /// Reads rows matching `query`.
    pub async fn select<T>(&self, table: &str, query: &SelectQuery) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
    {
        let url = query.add_to_url(&self.table_url(table)?);
        tracing::debug!("GET {}", url);
        let (_, body) = self.send(self.http.get(url)).await?;

        serde_json::from_str::<Vec<T>>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse rows: {} | body: {}", e, snippet);
            Error::Parse(e.to_string())
        })
    }

    /// Counts rows matching `query` without transferring them. `None` when the
    /// store does not report a total.
    pub async fn count(&self, table: &str, query: &SelectQuery) -> Result<Option<u64>, Error> {
        let url = query.add_to_url(&self.table_url(table)?);
        tracing::debug!("HEAD {}", url);
        let (headers, _) = self
            .send(self.http.head(url).header("prefer", "count=exact"))
            .await?;
        Ok(parse_content_range_total(&headers))
    }

    /// Inserts rows. Fails on a uniqueness conflict.
    pub async fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.table_url(table)?;
        let body = serialize_rows(rows)?;
        self.send(
            self.http
                .post(url)
                .header("content-type", "application/json")
                .header("prefer", "return=minimal")
                .body(body),
        )
        .await?;
        Ok(())
    }

    /// Inserts rows, replacing any existing row that collides on `on_conflict`.
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
        on_conflict: &[&str],
    ) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut url = self.table_url(table)?;
        if !on_conflict.is_empty() {
            url.query_pairs_mut()
                .append_pair("on_conflict", &on_conflict.join(","));
        }
        let body = serialize_rows(rows)?;
        tracing::debug!("POST {} ({} rows, upsert)", url, rows.len());
        self.send(
            self.http
                .post(url)
                .header("content-type", "application/json")
                .header("prefer", "resolution=merge-duplicates,return=minimal")
                .body(body),
        )
        .await?;
        Ok(())
    }

    /// Deletes rows matching `query`, returning the number of deleted rows
    /// when the store reports it.
    pub async fn delete(&self, table: &str, query: &DeleteQuery) -> Result<Option<u64>, Error> {
        if query.is_unfiltered() {
            return Err(Error::UnfilteredDelete(table.to_string()));
        }
        let url = query.add_to_url(&self.table_url(table)?);
        tracing::debug!("DELETE {}", url);
        let (headers, _) = self
            .send(
                self.http
                    .delete(url)
                    .header("prefer", "count=exact,return=minimal"),
            )
            .await?;
        Ok(parse_content_range_total(&headers))
    }
}

fn serialize_rows<T: Serialize>(rows: &[T]) -> Result<String, Error> {
    serde_json::to_string(rows).map_err(|e| Error::Serialize(e.to_string()))
}

/// Reads the total from a `Content-Range: 0-9/10` or `*/10` header.
fn parse_content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.trim().parse::<u64>().ok())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
