// =============================================================================
// Polygon REST Client — quotes, aggregates, option chain and Greeks feed
// =============================================================================
//
// SECURITY: The API key travels only as the `apiKey` query parameter and is
// never logged. Error messages name the endpoint, never the full URL.
//
// Endpoints used:
//   /v2/snapshot/locale/us/markets/stocks/tickers/{T}   stock snapshot quote
//   /v2/aggs/ticker/{T}/prev                            previous close
//   /v2/aggs/ticker/{T}/range/1/day/{from}/{to}         daily bars
//   /v3/snapshot/options/{T}                            chain (paginated)
//   /v3/snapshot/options/{T}/{contract}                 single contract
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    get_json, json_f64, usable_price, ChainSource, DataSource, GreeksFeed, HistoricalSource,
    QuoteSource, RawPriceSource,
};
use crate::types::{
    GreeksOrigin, GreeksSet, HistoricalBars, OptionType, PriceQuote, PriceSeries, QuoteOrigin,
    RawContract,
};

/// Contracts requested per chain page (Polygon's maximum).
const CHAIN_PAGE_LIMIT: u32 = 250;

/// Calendar days of daily bars requested for history.
const HISTORY_LOOKBACK_DAYS: i64 = 365;

#[derive(Clone)]
pub struct PolygonClient {
    api_key: Option<String>,
    base_url: String,
    max_pages: usize,
    client: reqwest::Client,
}

impl PolygonClient {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        max_pages: usize,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_pages: max_pages.max(1),
            client,
        }
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("POLYGON_API_KEY is not set; polygon source unavailable")
    }

    // -------------------------------------------------------------------------
    // Quote / previous close
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "polygon::snapshot_quote")]
    async fn snapshot_quote(&self, ticker: &str) -> Result<PriceQuote> {
        let key = self.key()?;
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}?apiKey={}",
            self.base_url, ticker, key
        );
        let body = get_json(&self.client, &url, "polygon stock snapshot").await?;
        parse_snapshot_quote(ticker, &body)
    }

    #[instrument(skip(self), name = "polygon::prev_close")]
    async fn prev_close(&self, ticker: &str) -> Result<f64> {
        let key = self.key()?;
        let url = format!(
            "{}/v2/aggs/ticker/{}/prev?adjusted=true&apiKey={}",
            self.base_url, ticker, key
        );
        let body = get_json(&self.client, &url, "polygon previous close").await?;
        usable_price(body["results"].get(0).and_then(|r| json_f64(&r["c"])))
            .context("polygon previous close has no usable close")
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "polygon::daily_bars")]
    async fn daily_bars(&self, ticker: &str) -> Result<HistoricalBars> {
        let key = self.key()?;
        let to = Utc::now().date_naive();
        let from = to - ChronoDuration::days(HISTORY_LOOKBACK_DAYS);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&limit=500&apiKey={}",
            self.base_url, ticker, from, to, key
        );
        let body = get_json(&self.client, &url, "polygon daily aggregates").await?;
        parse_aggregates(&body, self.name())
    }

    // -------------------------------------------------------------------------
    // Option chain
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "polygon::chain_snapshot")]
    async fn chain_snapshot(
        &self,
        ticker: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<Vec<RawContract>> {
        let key = self.key()?;
        let mut url = format!(
            "{}/v3/snapshot/options/{}?limit={}&apiKey={}",
            self.base_url, ticker, CHAIN_PAGE_LIMIT, key
        );
        if let Some(e) = expiry {
            url.push_str(&format!("&expiration_date={e}"));
        }

        let mut contracts = Vec::new();
        for page in 0..self.max_pages {
            let body = get_json(&self.client, &url, "polygon option chain").await?;
            if let Some(results) = body["results"].as_array() {
                contracts.extend(results.iter().map(parse_chain_entry));
            }

            match body["next_url"].as_str().filter(|s| !s.is_empty()) {
                Some(next) => {
                    debug!(ticker, page, "following chain next_url");
                    url = with_api_key(next, key);
                }
                None => break,
            }
        }

        if contracts.is_empty() {
            anyhow::bail!("polygon option chain for {ticker} is empty");
        }
        debug!(ticker, contracts = contracts.len(), "polygon chain fetched");
        Ok(contracts)
    }

    // -------------------------------------------------------------------------
    // Greeks feed
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "polygon::contract_greeks")]
    async fn contract_greeks(&self, underlying: &str, contract_id: &str) -> Result<GreeksSet> {
        let key = self.key()?;
        let url = format!(
            "{}/v3/snapshot/options/{}/{}?apiKey={}",
            self.base_url, underlying, contract_id, key
        );
        let body = get_json(&self.client, &url, "polygon contract snapshot").await?;
        let greeks = &body["results"]["greeks"];
        Ok(GreeksSet {
            delta: json_f64(&greeks["delta"]),
            gamma: json_f64(&greeks["gamma"]),
            theta: json_f64(&greeks["theta"]),
            vega: json_f64(&greeks["vega"]),
            origin: GreeksOrigin::Feed,
        })
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl DataSource for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }
}

#[async_trait]
impl QuoteSource for PolygonClient {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        self.snapshot_quote(ticker).await
    }
}

#[async_trait]
impl RawPriceSource for PolygonClient {
    async fn fetch_raw_price(&self, ticker: &str) -> Result<f64> {
        self.prev_close(ticker).await
    }
}

#[async_trait]
impl HistoricalSource for PolygonClient {
    async fn fetch_history(&self, ticker: &str) -> Result<HistoricalBars> {
        self.daily_bars(ticker).await
    }
}

#[async_trait]
impl ChainSource for PolygonClient {
    async fn fetch_chain(
        &self,
        ticker: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<Vec<RawContract>> {
        self.chain_snapshot(ticker, expiry).await
    }
}

#[async_trait]
impl GreeksFeed for PolygonClient {
    async fn fetch_greeks(&self, underlying: &str, contract_id: &str) -> Result<GreeksSet> {
        self.contract_greeks(underlying, contract_id).await
    }
}

// =============================================================================
// Payload mapping
// =============================================================================

fn parse_snapshot_quote(ticker: &str, body: &Value) -> Result<PriceQuote> {
    let snap = &body["ticker"];
    let price = usable_price(json_f64(&snap["lastTrade"]["p"]))
        .or_else(|| usable_price(json_f64(&snap["day"]["c"])))
        .with_context(|| format!("polygon snapshot for {ticker} has no usable price"))?;

    Ok(PriceQuote {
        ticker: ticker.to_string(),
        price: Some(price),
        change_pct: json_f64(&snap["todaysChangePerc"]),
        volume: json_f64(&snap["day"]["v"]).filter(|v| *v > 0.0),
        avg_volume: None,
        origin: Some(QuoteOrigin::Source {
            name: "polygon".into(),
        }),
    })
}

fn parse_aggregates(body: &Value, source: &str) -> Result<HistoricalBars> {
    let results = body["results"]
        .as_array()
        .context("polygon aggregates response has no results array")?;

    let mut closes = Vec::with_capacity(results.len());
    let mut volumes = Vec::with_capacity(results.len());
    for bar in results {
        if let Some(c) = json_f64(&bar["c"]) {
            closes.push(c);
            volumes.push(json_f64(&bar["v"]).unwrap_or(0.0));
        }
    }

    if closes.is_empty() {
        anyhow::bail!("polygon aggregates contain no closes");
    }

    Ok(HistoricalBars {
        closes: PriceSeries::new(closes),
        volumes,
        source: Some(source.to_string()),
    })
}

fn parse_chain_entry(entry: &Value) -> RawContract {
    let details = &entry["details"];
    let greeks = &entry["greeks"];
    let quote = &entry["last_quote"];

    RawContract {
        symbol: details["ticker"].as_str().map(str::to_string),
        strike: json_f64(&details["strike_price"]),
        option_type: details["contract_type"]
            .as_str()
            .and_then(OptionType::from_label),
        implied_volatility: json_f64(&entry["implied_volatility"]),
        expiry: details["expiration_date"]
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        bid: json_f64(&quote["bid"]),
        ask: json_f64(&quote["ask"]),
        open_interest: json_f64(&entry["open_interest"]),
        delta: json_f64(&greeks["delta"]),
        theta: json_f64(&greeks["theta"]),
        gamma: json_f64(&greeks["gamma"]),
        vega: json_f64(&greeks["vega"]),
    }
}

/// Polygon's `next_url` omits the key; re-attach it.
fn with_api_key(next_url: &str, key: &str) -> String {
    let sep = if next_url.contains('?') { '&' } else { '?' };
    format!("{next_url}{sep}apiKey={key}")
}
