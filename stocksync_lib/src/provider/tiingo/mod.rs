//! Tiingo end-of-day client.
//!
//! Tiingo retains history for tickers that have been delisted or acquired,
//! which makes it a useful secondary source behind Yahoo Finance.

pub mod client;
pub mod types;

pub use client::TiingoClient;
