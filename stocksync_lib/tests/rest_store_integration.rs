use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stocksync_lib::tablestore_api::Client;
use stocksync_lib::{PriceBar, PriceStore, RestStore, StoreError};
use wiremock::matchers::{body_json, header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn store(server: &MockServer) -> RestStore {
    let client = Client::new(&server.uri(), "service-key").unwrap();
    RestStore::new(client, "stock_data").unwrap()
}

#[tokio::test]
async fn latest_date_reads_newest_row() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("select", "date"))
        .and(query_param("ticker", "eq.AAPL"))
        .and(query_param("order", "date.desc"))
        .and(query_param("limit", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"date": "2024-06-13"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let latest = store(&server).latest_date("AAPL").await.unwrap();
    assert_eq!(latest, Some(d(2024, 6, 13)));
}

#[tokio::test]
async fn latest_date_none_for_unknown_ticker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    assert_eq!(store(&server).latest_date("NVDA").await.unwrap(), None);
}

#[tokio::test]
async fn bars_since_pages_through_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "eq.MSFT"))
        .and(query_param("date", "gte.2024-06-10"))
        .and(query_param("order", "date.asc"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"ticker": "MSFT", "date": "2024-06-10", "open": 426.1, "high": 427.5,
             "low": 424.0, "close": 427.87, "volume": 14003000},
            {"ticker": "MSFT", "date": "2024-06-11", "open": "425.48", "high": "432.82",
             "low": "425.25", "close": "432.68", "volume": 14551100}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"ticker": "MSFT", "date": "2024-06-12", "open": null, "high": null,
             "low": null, "close": 441.06, "volume": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let bars = store(&server)
        .with_page_size(2)
        .bars_since("MSFT", d(2024, 6, 10))
        .await
        .unwrap();

    assert_eq!(bars.len(), 3);
    assert_eq!(bars[0].close, Some(Decimal::from_str("427.87").unwrap()));
    assert_eq!(bars[1].high, Some(Decimal::from_str("432.82").unwrap()));
    assert_eq!(bars[2].date, d(2024, 6, 12));
    assert_eq!(bars[2].volume, None);
}

#[tokio::test]
async fn upsert_posts_rows_with_conflict_target() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("on_conflict", "ticker,date"))
        .and(headers("prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
        .and(body_json(serde_json::json!([
            {"ticker": "AAPL", "date": "2024-06-14", "open": "213.85", "high": "215.17",
             "low": "211.3", "close": "212.49", "volume": 70122700}
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let bar = PriceBar {
        ticker: "AAPL".to_string(),
        date: d(2024, 6, 14),
        open: Some(Decimal::from_str("213.85").unwrap()),
        high: Some(Decimal::from_str("215.17").unwrap()),
        low: Some(Decimal::from_str("211.3").unwrap()),
        close: Some(Decimal::from_str("212.49").unwrap()),
        volume: Some(70_122_700),
    };
    let written = store(&server).upsert_bars(&[bar]).await.unwrap();
    assert_eq!(written, 1);
}

#[tokio::test]
async fn delete_before_reports_count() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("date", "lt.2019-06-17"))
        .and(headers("prefer", vec!["count=exact", "return=minimal"]))
        .respond_with(ResponseTemplate::new(204).insert_header("content-range", "*/12"))
        .expect(1)
        .mount(&server)
        .await;

    let deleted = store(&server).delete_before(d(2019, 6, 17)).await.unwrap();
    assert_eq!(deleted, Some(12));
}

#[tokio::test]
async fn delete_tickers_uses_in_filter() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "in.(ATVI,TWTR)"))
        .respond_with(ResponseTemplate::new(204).insert_header("content-range", "*/40"))
        .expect(1)
        .mount(&server)
        .await;

    let deleted = store(&server)
        .delete_tickers(&["ATVI".to_string(), "TWTR".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, Some(40));
}

#[tokio::test]
async fn short_page_does_not_end_paging() {
    let server = MockServer::start().await;

    // Server caps pages at 2 rows even though 1000 were asked for.
    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("limit", "1000"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"ticker": "NVDA", "date": "2024-06-12", "close": 125.2},
            {"ticker": "NVDA", "date": "2024-06-13", "close": 129.61}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"ticker": "NVDA", "date": "2024-06-14", "close": 131.88}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let bars = store(&server).bars_since("NVDA", d(2024, 6, 12)).await.unwrap();
    assert_eq!(bars.len(), 3);
    assert_eq!(bars[2].date, d(2024, 6, 14));
}

fn rows(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

async fn mount_ticker_scan(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("select", "ticker"))
        .and(query_param("ticker", "gt.AAPL"))
        .respond_with(rows(serde_json::json!([{"ticker": "MSFT"}])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("select", "ticker"))
        .and(query_param("ticker", "gt.MSFT"))
        .respond_with(rows(serde_json::json!([])))
        .mount(server)
        .await;

    // First step of the scan carries no ticker filter.
    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("select", "ticker"))
        .and(query_param("order", "ticker.asc"))
        .and(query_param("limit", "1"))
        .respond_with(rows(serde_json::json!([{"ticker": "AAPL"}])))
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn distinct_tickers_skip_scan() {
    let server = MockServer::start().await;
    mount_ticker_scan(&server).await;

    let tickers = store(&server).distinct_tickers().await.unwrap();
    assert_eq!(tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);
}

#[tokio::test]
async fn ticker_summaries_read_edges_and_counts() {
    let server = MockServer::start().await;
    mount_ticker_scan(&server).await;

    for (ticker, order, date) in [
        ("AAPL", "date.asc", "2024-06-12"),
        ("AAPL", "date.desc", "2024-06-13"),
        ("MSFT", "date.asc", "2024-06-13"),
        ("MSFT", "date.desc", "2024-06-13"),
    ] {
        Mock::given(method("GET"))
            .and(path("/rest/v1/stock_data"))
            .and(query_param("select", "date"))
            .and(query_param("ticker", format!("eq.{}", ticker)))
            .and(query_param("order", order))
            .and(query_param("limit", "1"))
            .respond_with(rows(serde_json::json!([{"date": date}])))
            .mount(&server)
            .await;
    }

    Mock::given(method("HEAD"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "eq.AAPL"))
        .and(header("prefer", "count=exact"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-1/2"))
        .expect(1)
        .mount(&server)
        .await;

    // No total reported for MSFT, so its dates are paged instead.
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "eq.MSFT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "eq.MSFT"))
        .and(query_param("offset", "0"))
        .respond_with(rows(serde_json::json!([{"date": "2024-06-13"}])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .and(query_param("ticker", "eq.MSFT"))
        .and(query_param("offset", "1"))
        .respond_with(rows(serde_json::json!([])))
        .mount(&server)
        .await;

    let summaries = store(&server).ticker_summaries().await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].ticker, "AAPL");
    assert_eq!(summaries[0].rows, 2);
    assert_eq!(summaries[0].first_date, d(2024, 6, 12));
    assert_eq!(summaries[0].last_date, d(2024, 6, 13));
    assert_eq!(summaries[1].ticker, "MSFT");
    assert_eq!(summaries[1].rows, 1);
}

#[tokio::test]
async fn server_error_surfaces_as_store_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/stock_data"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = store(&server).latest_date("AAPL").await.unwrap_err();
    match err {
        StoreError::Rest(inner) => assert!(inner.is_transient()),
        other => panic!("expected Rest error, got {:?}", other),
    }
}

#[test]
fn invalid_table_name_rejected() {
    let client = Client::new("http://localhost:54321", "key").unwrap();
    let result = RestStore::new(client, "stock data");
    assert!(matches!(result, Err(StoreError::InvalidTable(_))));
}
