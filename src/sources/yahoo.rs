// =============================================================================
// Yahoo Finance Client — chart quote/history and option chain
// =============================================================================
//
// No credential is required. The chart endpoint serves both the quote (from
// `meta`) and one year of daily bars (from `indicators.quote[0]`), so the
// quote's trailing average volume comes from the same payload.
//
// Option chain IVs are reported as 0–1 fractions; the reconciler rescales.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    get_json, json_f64, usable_price, ChainSource, DataSource, HistoricalSource, QuoteSource,
    RawPriceSource,
};
use crate::indicators::volume::{trailing_average_volume, AVERAGE_VOLUME_WINDOW};
use crate::types::{
    HistoricalBars, OptionType, PriceQuote, PriceSeries, QuoteOrigin, RawContract,
};

#[derive(Clone)]
pub struct YahooClient {
    base_url: String,
    client: reqwest::Client,
}

/// The parts of a chart response the adapters use.
#[derive(Debug, Clone)]
struct ChartData {
    price: Option<f64>,
    previous_close: Option<f64>,
    market_volume: Option<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    #[instrument(skip(self), name = "yahoo::chart")]
    async fn chart(&self, ticker: &str) -> Result<ChartData> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d",
            self.base_url, ticker
        );
        let body = get_json(&self.client, &url, "yahoo chart").await?;
        parse_chart(&body)
    }

    #[instrument(skip(self), name = "yahoo::options")]
    async fn options(&self, ticker: &str, expiry: Option<NaiveDate>) -> Result<Vec<RawContract>> {
        let mut url = format!("{}/v7/finance/options/{}", self.base_url, ticker);
        if let Some(epoch) = expiry.and_then(expiry_epoch) {
            url.push_str(&format!("?date={epoch}"));
        }
        let body = get_json(&self.client, &url, "yahoo options").await?;
        let contracts = parse_options(&body)?;
        debug!(ticker, contracts = contracts.len(), "yahoo chain fetched");
        Ok(contracts)
    }
}

// =============================================================================
// Trait impls
// =============================================================================

impl DataSource for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }
}

#[async_trait]
impl QuoteSource for YahooClient {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        let chart = self.chart(ticker).await?;
        chart_to_quote(ticker, &chart)
    }
}

#[async_trait]
impl RawPriceSource for YahooClient {
    async fn fetch_raw_price(&self, ticker: &str) -> Result<f64> {
        let chart = self.chart(ticker).await?;
        chart
            .previous_close
            .context("yahoo chart has no previous close")
    }
}

#[async_trait]
impl HistoricalSource for YahooClient {
    async fn fetch_history(&self, ticker: &str) -> Result<HistoricalBars> {
        let chart = self.chart(ticker).await?;
        if chart.closes.is_empty() {
            anyhow::bail!("yahoo chart for {ticker} has no closes");
        }
        Ok(HistoricalBars {
            closes: PriceSeries::new(chart.closes),
            volumes: chart.volumes,
            source: Some(self.name().to_string()),
        })
    }
}

#[async_trait]
impl ChainSource for YahooClient {
    async fn fetch_chain(
        &self,
        ticker: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<Vec<RawContract>> {
        self.options(ticker, expiry).await
    }
}

// =============================================================================
// Payload mapping
// =============================================================================

fn parse_chart(body: &Value) -> Result<ChartData> {
    let result = body["chart"]["result"]
        .get(0)
        .context("yahoo chart response has no result")?;
    let meta = &result["meta"];
    let quote = &result["indicators"]["quote"][0];

    let raw_closes = quote["close"].as_array().cloned().unwrap_or_default();
    let raw_volumes = quote["volume"].as_array().cloned().unwrap_or_default();

    // Null closes (halted days) are dropped together with their volume.
    let mut closes = Vec::with_capacity(raw_closes.len());
    let mut volumes = Vec::with_capacity(raw_closes.len());
    for (i, c) in raw_closes.iter().enumerate() {
        if let Some(c) = json_f64(c) {
            closes.push(c);
            volumes.push(raw_volumes.get(i).and_then(json_f64).unwrap_or(0.0));
        }
    }

    // `chartPreviousClose` is the close before the requested range began, a
    // year back here, so it is never read.
    let previous_close = usable_price(json_f64(&meta["regularMarketPreviousClose"]))
        .or_else(|| usable_price(json_f64(&meta["previousClose"])))
        .or_else(|| usable_price(closes.iter().rev().nth(1).copied()));

    Ok(ChartData {
        price: usable_price(json_f64(&meta["regularMarketPrice"])),
        previous_close,
        market_volume: json_f64(&meta["regularMarketVolume"]).filter(|v| *v > 0.0),
        closes,
        volumes,
    })
}

fn chart_to_quote(ticker: &str, chart: &ChartData) -> Result<PriceQuote> {
    let price = chart
        .price
        .or_else(|| usable_price(chart.closes.last().copied()))
        .with_context(|| format!("yahoo chart for {ticker} has no usable price"))?;

    let change_pct = chart
        .previous_close
        .map(|prev| (price - prev) / prev * 100.0);

    let volume = chart
        .market_volume
        .or_else(|| chart.volumes.last().copied().filter(|v| *v > 0.0));

    Ok(PriceQuote {
        ticker: ticker.to_string(),
        price: Some(price),
        change_pct,
        volume,
        avg_volume: trailing_average_volume(&chart.volumes, AVERAGE_VOLUME_WINDOW),
        origin: Some(QuoteOrigin::Source {
            name: "yahoo".into(),
        }),
    })
}

fn parse_options(body: &Value) -> Result<Vec<RawContract>> {
    let block = body["optionChain"]["result"]
        .get(0)
        .and_then(|r| r["options"].get(0))
        .context("yahoo options response has no option block")?;

    let mut contracts = Vec::new();
    for (key, option_type) in [("calls", OptionType::Call), ("puts", OptionType::Put)] {
        if let Some(rows) = block[key].as_array() {
            contracts.extend(rows.iter().map(|row| parse_option_row(row, option_type)));
        }
    }

    if contracts.is_empty() {
        anyhow::bail!("yahoo option chain is empty");
    }
    Ok(contracts)
}

fn parse_option_row(row: &Value, option_type: OptionType) -> RawContract {
    RawContract {
        symbol: row["contractSymbol"].as_str().map(str::to_string),
        strike: json_f64(&row["strike"]),
        option_type: Some(option_type),
        implied_volatility: json_f64(&row["impliedVolatility"]),
        expiry: row["expiration"]
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()),
        bid: json_f64(&row["bid"]),
        ask: json_f64(&row["ask"]),
        open_interest: json_f64(&row["openInterest"]),
        ..RawContract::default()
    }
}

/// Yahoo addresses an expiry by the UNIX timestamp of its UTC midnight.
fn expiry_epoch(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}
