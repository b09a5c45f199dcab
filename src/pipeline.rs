// =============================================================================
// Instrument Pipeline — one merged, scored row per ticker
// =============================================================================
//
// Per ticker, in one pass:
//
//   quote ──┐
//   history ├─► indicators ─► technical ─┐
//   chain ──┼─► ATM call ─► Greeks ──────┼─► composite ─► signal
//   sentiment ───────────────────────────┘
//
// Quote, history and chain share the market TTL; sentiment has its own and
// is shared by every ticker. Nothing here returns an error: every failure
// has already been turned into an absent field by the layer that saw it.
// =============================================================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, TtlCache, TtlClass};
use crate::chain::{atm_contract, ChainAssembler};
use crate::greeks::GreeksResolver;
use crate::indicators::IndicatorSnapshot;
use crate::runtime_config::{Credentials, RuntimeConfig, ScoringParams};
use crate::screener::{shortlist, ScreenedContract, ScreenerRules};
use crate::selector::{HistoricalSelector, QuoteSelector, SentimentSelector};
use crate::signals::{
    classify_signal, dte_score, greeks_score, sentiment_score, technical_score, GreeksInputs,
    ScoreBreakdown, Signal, TechnicalInputs,
};
use crate::sources::{
    http_client, ChainSource, CsvFileSource, FredClient, GreeksFeed, HistoricalSource,
    PolygonClient, QuoteSource, RawPriceSource, SentimentSource, YahooClient,
};
use crate::stream::StreamTarget;
use crate::symbology::{stream_option_symbol, stream_trade_symbol};
use crate::types::{
    GreeksSet, HistoricalBars, OptionContract, OptionType, PriceQuote, SentimentSnapshot,
};

// =============================================================================
// InstrumentRow
// =============================================================================

/// Everything the consumer sees for one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentRow {
    pub ticker: String,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: Option<f64>,
    pub avg_volume: Option<f64>,
    pub quote_source: Option<String>,
    pub indicators: IndicatorSnapshot,
    pub sentiment: SentimentSnapshot,
    pub expiry: Option<NaiveDate>,
    pub strike: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: Option<f64>,
    pub implied_volatility: Option<f64>,
    pub greeks: GreeksSet,
    pub breakeven: Option<f64>,
    pub dte: Option<i64>,
    pub scores: ScoreBreakdown,
    pub signal: Signal,
    /// Messages received on the live feed, when this ticker is the one
    /// being streamed.
    pub stream_messages: Option<u64>,
    /// RFC 3339.
    pub timestamp: String,
}

// =============================================================================
// Source wiring
// =============================================================================

/// The adapters a pipeline draws from, already in priority order.
#[derive(Clone, Default)]
pub struct PipelineSources {
    pub quotes: Vec<Arc<dyn QuoteSource>>,
    pub raw_prices: Vec<Arc<dyn RawPriceSource>>,
    pub history: Vec<Arc<dyn HistoricalSource>>,
    pub sentiment: Vec<Arc<dyn SentimentSource>>,
    /// Picks the expiry for the scored contract.
    pub chain_primary: Option<Arc<dyn ChainSource>>,
    /// Asked for the same expiry; also the multi-expiry chain for screening.
    pub chain_secondary: Option<Arc<dyn ChainSource>>,
    pub greeks_feed: Option<Arc<dyn GreeksFeed>>,
}

impl PipelineSources {
    /// Build the live adapters. Quote and raw-price sources follow
    /// `quote_priority`; unknown names are skipped with a warning.
    pub fn from_config(config: &RuntimeConfig, credentials: &Credentials) -> Self {
        let client = http_client(config.adapter_timeout());
        let ep = &config.endpoints;

        let polygon = Arc::new(PolygonClient::new(
            credentials.polygon_api_key.clone(),
            ep.polygon_base_url.clone(),
            ep.chain_max_pages,
            client.clone(),
        ));
        let yahoo = Arc::new(YahooClient::new(ep.yahoo_base_url.clone(), client.clone()));
        let csv = Arc::new(CsvFileSource::new(&ep.prices_csv, &ep.sentiment_csv));
        let fred = Arc::new(FredClient::new(
            credentials.fred_api_key.clone(),
            ep.fred_base_url.clone(),
            client,
        ));

        let mut quotes: Vec<Arc<dyn QuoteSource>> = Vec::new();
        let mut raw_prices: Vec<Arc<dyn RawPriceSource>> = Vec::new();
        for name in &config.quote_priority {
            match name.trim().to_ascii_lowercase().as_str() {
                "polygon" => {
                    quotes.push(polygon.clone());
                    raw_prices.push(polygon.clone());
                }
                "yahoo" => {
                    quotes.push(yahoo.clone());
                    raw_prices.push(yahoo.clone());
                }
                "csv" => {
                    quotes.push(csv.clone());
                    raw_prices.push(csv.clone());
                }
                other => warn!(source = other, "unknown quote source in priority list; skipped"),
            }
        }

        info!(
            priority = ?config.quote_priority,
            polygon_key = credentials.polygon_api_key.is_some(),
            fred_key = credentials.fred_api_key.is_some(),
            "data sources wired"
        );

        let history: Vec<Arc<dyn HistoricalSource>> = vec![yahoo.clone(), polygon.clone()];
        let sentiment: Vec<Arc<dyn SentimentSource>> = vec![csv, fred];

        Self {
            quotes,
            raw_prices,
            history,
            sentiment,
            chain_primary: Some(yahoo),
            chain_secondary: Some(polygon.clone()),
            greeks_feed: Some(polygon),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct Pipeline {
    quotes: QuoteSelector,
    history: HistoricalSelector,
    sentiment: SentimentSelector,
    chains: ChainAssembler,
    greeks: GreeksResolver,
    quote_cache: TtlCache<PriceQuote>,
    history_cache: TtlCache<HistoricalBars>,
    chain_cache: TtlCache<Vec<OptionContract>>,
    sentiment_cache: TtlCache<SentimentSnapshot>,
    scoring: ScoringParams,
    rules: ScreenerRules,
}

impl Pipeline {
    pub fn new(sources: PipelineSources, config: &RuntimeConfig) -> Self {
        let timeout = config.adapter_timeout();
        Self {
            quotes: QuoteSelector::new(sources.quotes, sources.raw_prices, timeout),
            history: HistoricalSelector::new(sources.history, timeout),
            sentiment: SentimentSelector::new(sources.sentiment, timeout),
            chains: ChainAssembler::new(sources.chain_primary, sources.chain_secondary, timeout),
            greeks: GreeksResolver::new(sources.greeks_feed, timeout, config.risk_free_rate),
            quote_cache: TtlCache::for_class(TtlClass::Market, config),
            history_cache: TtlCache::for_class(TtlClass::Market, config),
            chain_cache: TtlCache::for_class(TtlClass::Market, config),
            sentiment_cache: TtlCache::for_class(TtlClass::Sentiment, config),
            scoring: config.scoring.clone(),
            rules: ScreenerRules::default(),
        }
    }

    pub fn from_config(config: &RuntimeConfig, credentials: &Credentials) -> Self {
        Self::new(PipelineSources::from_config(config, credentials), config)
    }

    // -------------------------------------------------------------------------
    // Cached reads
    // -------------------------------------------------------------------------

    async fn quote(&self, ticker: &str) -> PriceQuote {
        let key = CacheKey::new("quote", ticker, self.quotes.identity());
        self.quote_cache
            .get_or_fetch(key, || self.quotes.select(ticker))
            .await
    }

    async fn bars(&self, ticker: &str) -> HistoricalBars {
        let key = CacheKey::new("history", ticker, self.history.identity());
        self.history_cache
            .get_or_fetch(key, || self.history.select(ticker))
            .await
    }

    async fn macro_sentiment(&self) -> SentimentSnapshot {
        let key = CacheKey::new("sentiment", "macro", self.sentiment.identity());
        self.sentiment_cache
            .get_or_fetch(key, || self.sentiment.select())
            .await
    }

    async fn nearest_chain(&self, ticker: &str, today: NaiveDate) -> Vec<OptionContract> {
        // The nearest expiry depends on the day, so the day is part of the key.
        let key = CacheKey::new(
            "chain_nearest",
            format!("{ticker}@{today}"),
            self.chains.identity(),
        );
        self.chain_cache
            .get_or_fetch(key, || self.chains.nearest_expiry_chain(ticker, today))
            .await
    }

    async fn full_chain(&self, ticker: &str) -> Vec<OptionContract> {
        let key = CacheKey::new("chain_all", ticker, self.chains.identity());
        self.chain_cache
            .get_or_fetch(key, || self.chains.all_expiries_chain(ticker))
            .await
    }

    /// Drop expired cache entries.
    pub fn purge_caches(&self) {
        self.quote_cache.purge_expired();
        self.history_cache.purge_expired();
        self.chain_cache.purge_expired();
        self.sentiment_cache.purge_expired();
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    pub async fn evaluate(&self, ticker: &str) -> InstrumentRow {
        self.evaluate_on(ticker, Utc::now().date_naive()).await
    }

    /// Evaluate as of `today`. Never fails; missing inputs show up as absent
    /// fields and zero sub-score contributions.
    pub async fn evaluate_on(&self, ticker: &str, today: NaiveDate) -> InstrumentRow {
        let ticker = ticker.trim().to_uppercase();
        let (quote, bars, sentiment, chain) = tokio::join!(
            self.quote(&ticker),
            self.bars(&ticker),
            self.macro_sentiment(),
            self.nearest_chain(&ticker, today),
        );

        let indicators = IndicatorSnapshot::compute(&bars, &quote);
        let atm = atm_call(&chain, quote.price).cloned();

        let greeks = match &atm {
            Some(contract) => self.greeks.resolve(&ticker, contract, quote.price, today).await,
            None => GreeksSet::unavailable(),
        };
        let dte = atm.as_ref().and_then(|c| c.days_to_expiry(today));

        let technical = technical_score(&TechnicalInputs {
            trend: indicators.trend,
            rsi: indicators.rsi,
            macd_rising: indicators.macd_rising(),
            volume_ratio: indicators.volume_ratio,
        });
        let greeks_part = greeks_score(
            &GreeksInputs {
                delta: greeks.delta,
                theta: greeks.theta,
                gamma: greeks.gamma,
                // No IV history is kept between refreshes.
                iv_week_change: None,
                spread: atm.as_ref().and_then(OptionContract::spread),
            },
            &self.scoring,
        );
        let scores = ScoreBreakdown::new(
            technical,
            greeks_part,
            sentiment_score(&sentiment),
            dte_score(dte, &self.scoring),
            &self.scoring.weights,
        );
        let signal = classify_signal(scores.composite, greeks.theta, dte, &self.scoring);

        debug!(
            ticker = %ticker,
            composite = scores.composite,
            signal = %signal,
            greeks = ?greeks.origin,
            "instrument evaluated"
        );

        InstrumentRow {
            price: quote.price,
            change_pct: quote.change_pct,
            volume: indicators.volume,
            avg_volume: indicators.avg_volume,
            quote_source: quote.origin.as_ref().map(ToString::to_string),
            indicators,
            sentiment,
            expiry: atm.as_ref().and_then(|c| c.expiry),
            strike: atm.as_ref().map(|c| c.strike),
            bid: atm.as_ref().and_then(|c| c.bid),
            ask: atm.as_ref().and_then(|c| c.ask),
            open_interest: atm.as_ref().and_then(|c| c.open_interest),
            implied_volatility: atm.as_ref().and_then(|c| c.implied_volatility),
            breakeven: atm.as_ref().and_then(OptionContract::breakeven),
            greeks,
            dte,
            scores,
            signal,
            stream_messages: None,
            timestamp: Utc::now().to_rfc3339(),
            ticker,
        }
    }

    /// Evaluate every ticker concurrently; rows come back in input order.
    pub async fn evaluate_all(&self, tickers: &[String]) -> Vec<InstrumentRow> {
        join_all(tickers.iter().map(|t| self.evaluate(t))).await
    }

    pub async fn screen(&self, ticker: &str) -> Vec<ScreenedContract> {
        self.screen_on(ticker, Utc::now().date_naive()).await
    }

    pub async fn screen_on(&self, ticker: &str, today: NaiveDate) -> Vec<ScreenedContract> {
        let ticker = ticker.trim().to_uppercase();
        let (quote, chain) = tokio::join!(self.quote(&ticker), self.full_chain(&ticker));
        let picks = shortlist(&ticker, &chain, quote.price, today, &self.rules);
        debug!(ticker = %ticker, contracts = chain.len(), picks = picks.len(), "chain screened");
        picks
    }

    /// Live-feed channels for `ticker`: its ATM call when one is known, plus
    /// the underlying's trades.
    pub async fn stream_target(&self, ticker: &str) -> StreamTarget {
        self.stream_target_on(ticker, Utc::now().date_naive()).await
    }

    pub async fn stream_target_on(&self, ticker: &str, today: NaiveDate) -> StreamTarget {
        let ticker = ticker.trim().to_uppercase();
        let (quote, chain) = tokio::join!(self.quote(&ticker), self.nearest_chain(&ticker, today));

        let mut symbols = Vec::with_capacity(2);
        if let Some(c) = atm_call(&chain, quote.price) {
            if let Some(expiry) = c.expiry {
                symbols.push(stream_option_symbol(&ticker, expiry, c.option_type, c.strike));
            }
        }
        symbols.push(stream_trade_symbol(&ticker));

        StreamTarget { ticker, symbols }
    }
}

fn atm_call(chain: &[OptionContract], spot: Option<f64>) -> Option<&OptionContract> {
    let spot = spot?;
    atm_contract(
        chain.iter().filter(|c| c.option_type == OptionType::Call),
        spot,
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use crate::signals::{composite_score, SignalKind};
    use crate::sources::DataSource;
    use crate::types::{GreeksOrigin, PriceSeries, RawContract};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    /// One fake standing in for every adapter kind.
    #[derive(Default)]
    struct Fake {
        price: Option<f64>,
        chain: Vec<RawContract>,
        quote_calls: AtomicUsize,
        chain_calls: AtomicUsize,
    }

    impl DataSource for Fake {
        fn name(&self) -> &str {
            "fake"
        }
    }

    #[async_trait]
    impl QuoteSource for Fake {
        async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            if ticker == "BROKEN" {
                bail!("upstream down");
            }
            Ok(PriceQuote {
                price: self.price,
                change_pct: Some(1.2),
                volume: Some(1_000.0),
                avg_volume: Some(800.0),
                ..PriceQuote::empty(ticker)
            })
        }
    }

    #[async_trait]
    impl RawPriceSource for Fake {
        async fn fetch_raw_price(&self, _ticker: &str) -> Result<f64> {
            bail!("no raw price")
        }
    }

    #[async_trait]
    impl HistoricalSource for Fake {
        async fn fetch_history(&self, _ticker: &str) -> Result<HistoricalBars> {
            Ok(HistoricalBars {
                closes: PriceSeries::new((1..=250).map(|x| x as f64).collect()),
                volumes: vec![1_000.0; 250],
                source: Some("fake".into()),
            })
        }
    }

    #[async_trait]
    impl ChainSource for Fake {
        async fn fetch_chain(
            &self,
            _ticker: &str,
            _expiry: Option<NaiveDate>,
        ) -> Result<Vec<RawContract>> {
            self.chain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chain.clone())
        }
    }

    #[async_trait]
    impl GreeksFeed for Fake {
        async fn fetch_greeks(&self, _underlying: &str, _contract_id: &str) -> Result<GreeksSet> {
            Ok(GreeksSet {
                delta: Some(0.5),
                gamma: Some(0.02),
                theta: Some(-0.05),
                vega: Some(0.1),
                origin: GreeksOrigin::Feed,
            })
        }
    }

    #[async_trait]
    impl SentimentSource for Fake {
        async fn fetch_sentiment(&self) -> Result<SentimentSnapshot> {
            Ok(SentimentSnapshot {
                vix: Some(20.0),
                put_call: Some(1.0),
                fear_greed: Some(50.0),
                macro_risk: Some(10.0),
            })
        }
    }

    fn call(strike: f64, expiry: NaiveDate) -> RawContract {
        RawContract {
            strike: Some(strike),
            option_type: Some(OptionType::Call),
            implied_volatility: Some(0.25),
            expiry: Some(expiry),
            bid: Some(2.0),
            ask: Some(2.05),
            open_interest: Some(1_500.0),
            ..Default::default()
        }
    }

    fn wired(fake: Arc<Fake>) -> Pipeline {
        let sources = PipelineSources {
            quotes: vec![fake.clone()],
            raw_prices: vec![fake.clone()],
            history: vec![fake.clone()],
            sentiment: vec![fake.clone()],
            chain_primary: Some(fake.clone()),
            chain_secondary: None,
            greeks_feed: Some(fake),
        };
        Pipeline::new(sources, &RuntimeConfig::default())
    }

    #[tokio::test]
    async fn no_sources_still_yields_a_row() {
        let pipeline = Pipeline::new(PipelineSources::default(), &RuntimeConfig::default());
        let row = pipeline.evaluate_on("nvda", today()).await;

        assert_eq!(row.ticker, "NVDA");
        assert!(row.price.is_none());
        assert!(row.strike.is_none());
        assert_eq!(row.greeks.origin, GreeksOrigin::Unavailable);
        assert_eq!(row.scores.composite, 0);
        assert_eq!(row.signal.kind, SignalKind::Sell);
    }

    #[tokio::test]
    async fn full_row_from_fake_sources() {
        let expiry = today() + chrono::Duration::days(20);
        let fake = Arc::new(Fake {
            price: Some(101.0),
            chain: vec![call(95.0, expiry), call(100.0, expiry), call(110.0, expiry)],
            ..Default::default()
        });
        let row = wired(fake).evaluate_on("NVDA", today()).await;

        assert_eq!(row.price, Some(101.0));
        assert_eq!(row.quote_source.as_deref(), Some("fake"));
        assert_eq!(row.strike, Some(100.0));
        assert_eq!(row.implied_volatility, Some(25.0));
        assert_eq!(row.dte, Some(20));
        assert_eq!(row.greeks.origin, GreeksOrigin::Feed);
        assert!((row.breakeven.unwrap() - 102.025).abs() < 1e-9);

        // 20 (delta) + 9.95 (theta) + 5 (gamma); spread 0.05 is not penalised.
        assert!((row.scores.greeks - 34.95).abs() < 1e-9);
        // 0.3*20 + 0.3*1 + 0.3*50 + 0.1*10 = 22.3
        assert_eq!(row.scores.sentiment, 22);
        assert_eq!(row.scores.dte, 6);
        assert_eq!(
            row.scores.composite,
            composite_score(row.scores.technical, row.scores.greeks, 22, 6)
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&row.timestamp).is_ok());
    }

    #[tokio::test]
    async fn quotes_are_served_from_cache() {
        let fake = Arc::new(Fake {
            price: Some(50.0),
            ..Default::default()
        });
        let pipeline = wired(fake.clone());

        pipeline.evaluate_on("AMD", today()).await;
        pipeline.evaluate_on("AMD", today()).await;
        assert_eq!(fake.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nearest_chain_is_cached_per_day() {
        let this_week = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let later = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        let fake = Arc::new(Fake {
            price: Some(100.0),
            chain: vec![call(100.0, this_week), call(100.0, later)],
            ..Default::default()
        });
        let pipeline = wired(fake.clone());

        let monday = pipeline.evaluate_on("SPY", today()).await;
        let again = pipeline.evaluate_on("SPY", today()).await;
        assert_eq!(monday.expiry, Some(this_week));
        assert_eq!(again.expiry, Some(this_week));
        assert_eq!(fake.chain_calls.load(Ordering::SeqCst), 1);

        // After the weekly contract expired the next listed expiry is used.
        let next_week = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let row = pipeline.evaluate_on("SPY", next_week).await;
        assert_eq!(row.expiry, Some(later));
        assert_eq!(fake.chain_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_failing_ticker_does_not_block_others() {
        let fake = Arc::new(Fake {
            price: Some(50.0),
            ..Default::default()
        });
        let pipeline = wired(fake);
        let tickers = vec!["AMD".to_string(), "BROKEN".to_string(), "META".to_string()];

        let rows = pipeline.evaluate_all(&tickers).await;
        let names: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(names, vec!["AMD", "BROKEN", "META"]);
        assert!(rows[0].price.is_some());
        assert!(rows[1].price.is_none());
        assert!(rows[2].price.is_some());
    }

    #[tokio::test]
    async fn stream_target_pairs_atm_call_with_underlying() {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        let fake = Arc::new(Fake {
            price: Some(149.0),
            chain: vec![call(150.0, expiry), call(160.0, expiry)],
            ..Default::default()
        });
        let target = wired(fake).stream_target_on("nvda", today()).await;

        assert_eq!(target.ticker, "NVDA");
        assert_eq!(
            target.symbols,
            vec!["T.O:NVDA250321C00150000".to_string(), "T.NVDA".to_string()]
        );
    }

    #[tokio::test]
    async fn stream_target_without_chain_is_underlying_only() {
        let fake = Arc::new(Fake::default());
        let target = wired(fake).stream_target_on("SPY", today()).await;
        assert_eq!(target.symbols, vec!["T.SPY".to_string()]);
    }
}
