// =============================================================================
// Data Source Adapters
// =============================================================================
//
// Each upstream is wrapped in a small stateless client (credentials and a
// base URL only) that maps the raw payload onto the normalized records in
// `crate::types`. An adapter returns `Err` for anything that is not a usable
// answer: transport failure, non-success status, malformed or empty payload,
// missing credential. The selectors turn that `Err` into "unavailable".
//
//   polygon   — quotes, previous close, daily aggregates, chain, Greeks feed
//   yahoo     — chart quote and history, previous close, option chain
//   csv_file  — local prices.csv / sentiment.csv
//   fred      — VIX close series

pub mod csv_file;
pub mod fred;
pub mod polygon;
pub mod yahoo;

pub use csv_file::CsvFileSource;
pub use fred::FredClient;
pub use polygon::PolygonClient;
pub use yahoo::YahooClient;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::types::{GreeksSet, HistoricalBars, PriceQuote, RawContract, SentimentSnapshot};

// =============================================================================
// Adapter traits
// =============================================================================

/// Common identity of every adapter. The name is what appears in a quote's
/// origin and in the priority list of the config.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
}

/// A full quote (price plus auxiliary fields) from one source.
#[async_trait]
pub trait QuoteSource: DataSource {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote>;
}

/// A bare price used only by the median fallback.
#[async_trait]
pub trait RawPriceSource: DataSource {
    async fn fetch_raw_price(&self, ticker: &str) -> Result<f64>;
}

/// Daily closes and volumes, oldest first.
#[async_trait]
pub trait HistoricalSource: DataSource {
    async fn fetch_history(&self, ticker: &str) -> Result<HistoricalBars>;
}

/// An option chain for one expiry. `None` asks for the nearest expiry the
/// source lists.
#[async_trait]
pub trait ChainSource: DataSource {
    async fn fetch_chain(&self, ticker: &str, expiry: Option<NaiveDate>)
        -> Result<Vec<RawContract>>;
}

/// Per-contract Greeks lookup keyed by an exchange-style contract identifier.
#[async_trait]
pub trait GreeksFeed: DataSource {
    async fn fetch_greeks(&self, underlying: &str, contract_id: &str) -> Result<GreeksSet>;
}

#[async_trait]
pub trait SentimentSource: DataSource {
    async fn fetch_sentiment(&self) -> Result<SentimentSnapshot>;
}

// =============================================================================
// Shared HTTP helpers
// =============================================================================

const USER_AGENT: &str = concat!("options-desk/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the adapters.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// GET `url` and parse the body as JSON, failing on any non-success status.
///
/// `what` names the request in error messages; it must never contain a
/// credential, since the URL itself is not logged.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    what: &str,
) -> Result<serde_json::Value> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {what} request failed"))?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("GET {what} returned {status}");
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .with_context(|| format!("failed to parse {what} response body"))?;

    debug!(request = what, "upstream response received");
    Ok(body)
}

/// Read a JSON number, also accepting numeric strings.
pub(crate) fn json_f64(value: &serde_json::Value) -> Option<f64> {
    let v = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

/// A price is usable only when finite and strictly positive.
pub(crate) fn usable_price(value: Option<f64>) -> Option<f64> {
    value.filter(|p| p.is_finite() && *p > 0.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_f64_accepts_numbers_and_numeric_strings() {
        assert_eq!(json_f64(&json!(1.5)), Some(1.5));
        assert_eq!(json_f64(&json!("2.25")), Some(2.25));
        assert_eq!(json_f64(&json!(".")), None);
        assert_eq!(json_f64(&json!(null)), None);
    }

    #[test]
    fn usable_price_rejects_zero_and_negative() {
        assert_eq!(usable_price(Some(10.0)), Some(10.0));
        assert_eq!(usable_price(Some(0.0)), None);
        assert_eq!(usable_price(Some(-1.0)), None);
        assert_eq!(usable_price(None), None);
    }
}
