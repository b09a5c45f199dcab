// =============================================================================
// Fallback Selectors — one record out of N adapter outputs
// =============================================================================
//
// Quote selection:
//   1. Query every priority source concurrently (each under its own timeout).
//   2. The first source in priority order with a usable price wins and its
//      quote is taken verbatim, never mixed with another source's fields.
//   3. Otherwise query the raw-price sources concurrently and take the median
//      of whatever came back; only the price is filled in. A lone survivor
//      is credited to its own source rather than to a median.
//   4. Otherwise return the all-absent quote.
//
// History is a plain ordered fallback. Sentiment is merged field-wise, the
// earlier source winning every field it reports.
//
// Adapter errors stop here: they are logged and become "unavailable".
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::sources::{HistoricalSource, QuoteSource, RawPriceSource, SentimentSource};
use crate::types::{HistoricalBars, PriceQuote, QuoteOrigin, SentimentSnapshot};

/// Run one adapter call under `timeout`, logging and flattening any failure.
async fn guarded<T, F>(source: &str, ticker: &str, timeout: Duration, call: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(source, ticker, error = %e, "source unavailable");
            None
        }
        Err(_) => {
            warn!(source, ticker, timeout_ms = timeout.as_millis() as u64, "source timed out");
            None
        }
    }
}

/// Median of the finite values; the mean of the two middle values when the
/// count is even. `None` for no finite input.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    })
}

// =============================================================================
// Quotes
// =============================================================================

#[derive(Clone)]
pub struct QuoteSelector {
    priority: Vec<Arc<dyn QuoteSource>>,
    fallback: Vec<Arc<dyn RawPriceSource>>,
    timeout: Duration,
}

impl QuoteSelector {
    pub fn new(
        priority: Vec<Arc<dyn QuoteSource>>,
        fallback: Vec<Arc<dyn RawPriceSource>>,
        timeout: Duration,
    ) -> Self {
        Self {
            priority,
            fallback,
            timeout,
        }
    }

    /// Names of the adapters in use, for cache keys.
    pub fn identity(&self) -> String {
        let names: Vec<&str> = self
            .priority
            .iter()
            .map(|s| s.name())
            .chain(self.fallback.iter().map(|s| s.name()))
            .collect();
        names.join("+")
    }

    pub async fn select(&self, ticker: &str) -> PriceQuote {
        let answers = join_all(self.priority.iter().map(|src| {
            guarded(src.name(), ticker, self.timeout, src.fetch_quote(ticker))
        }))
        .await;

        for (src, answer) in self.priority.iter().zip(answers) {
            match answer {
                Some(mut quote) if quote.has_price() => {
                    quote.ticker = ticker.to_string();
                    quote.origin = Some(QuoteOrigin::Source {
                        name: src.name().to_string(),
                    });
                    debug!(ticker, source = src.name(), "quote selected");
                    return quote;
                }
                Some(_) => warn!(ticker, source = src.name(), "quote without usable price"),
                None => {}
            }
        }

        let answers = join_all(self.fallback.iter().map(|src| {
            guarded(src.name(), ticker, self.timeout, src.fetch_raw_price(ticker))
        }))
        .await;
        let raw: Vec<(&str, f64)> = self
            .fallback
            .iter()
            .zip(answers)
            .filter_map(|(src, p)| p.filter(|p| p.is_finite()).map(|p| (src.name(), p)))
            .collect();

        let origin = match raw.as_slice() {
            [] => {
                warn!(ticker, "all quote sources exhausted");
                return PriceQuote::empty(ticker);
            }
            [(name, _)] => QuoteOrigin::Source {
                name: name.to_string(),
            },
            _ => QuoteOrigin::Median { count: raw.len() },
        };
        let prices: Vec<f64> = raw.iter().map(|(_, p)| *p).collect();
        let price = median(&prices);
        debug!(ticker, count = prices.len(), ?price, "fallback price");

        PriceQuote {
            price,
            origin: Some(origin),
            ..PriceQuote::empty(ticker)
        }
    }
}

// =============================================================================
// History
// =============================================================================

#[derive(Clone)]
pub struct HistoricalSelector {
    sources: Vec<Arc<dyn HistoricalSource>>,
    timeout: Duration,
}

impl HistoricalSelector {
    pub fn new(sources: Vec<Arc<dyn HistoricalSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn identity(&self) -> String {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        names.join("+")
    }

    /// First non-empty series in order; the empty series when none answers.
    pub async fn select(&self, ticker: &str) -> HistoricalBars {
        for src in &self.sources {
            if let Some(bars) =
                guarded(src.name(), ticker, self.timeout, src.fetch_history(ticker)).await
            {
                if !bars.is_empty() {
                    debug!(ticker, source = src.name(), bars = bars.closes.len(), "history selected");
                    return bars;
                }
            }
        }
        warn!(ticker, "no historical source answered");
        HistoricalBars::empty()
    }
}

// =============================================================================
// Sentiment
// =============================================================================

#[derive(Clone)]
pub struct SentimentSelector {
    sources: Vec<Arc<dyn SentimentSource>>,
    timeout: Duration,
}

impl SentimentSelector {
    pub fn new(sources: Vec<Arc<dyn SentimentSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn identity(&self) -> String {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        names.join("+")
    }

    pub async fn select(&self) -> SentimentSnapshot {
        let answers = join_all(
            self.sources
                .iter()
                .map(|src| guarded(src.name(), "macro", self.timeout, src.fetch_sentiment())),
        )
        .await;

        let mut merged = SentimentSnapshot::default();
        for snapshot in answers.into_iter().flatten() {
            merged.fill_from(&snapshot);
            if merged.is_complete() {
                break;
            }
        }
        merged
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::DataSource;
    use crate::types::PriceSeries;
    use async_trait::async_trait;

    /// Scripted adapter: `None` fails, `Some` answers; `delay` simulates a
    /// slow upstream.
    struct Fake {
        name: &'static str,
        quote: Option<PriceQuote>,
        raw: Option<f64>,
        history: Option<HistoricalBars>,
        sentiment: Option<SentimentSnapshot>,
        delay: Duration,
    }

    impl Fake {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                quote: None,
                raw: None,
                history: None,
                sentiment: None,
                delay: Duration::ZERO,
            }
        }
    }

    impl DataSource for Fake {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl QuoteSource for Fake {
        async fn fetch_quote(&self, _ticker: &str) -> Result<PriceQuote> {
            tokio::time::sleep(self.delay).await;
            self.quote.clone().ok_or_else(|| anyhow::anyhow!("down"))
        }
    }

    #[async_trait]
    impl RawPriceSource for Fake {
        async fn fetch_raw_price(&self, _ticker: &str) -> Result<f64> {
            self.raw.ok_or_else(|| anyhow::anyhow!("down"))
        }
    }

    #[async_trait]
    impl HistoricalSource for Fake {
        async fn fetch_history(&self, _ticker: &str) -> Result<HistoricalBars> {
            self.history.clone().ok_or_else(|| anyhow::anyhow!("down"))
        }
    }

    #[async_trait]
    impl SentimentSource for Fake {
        async fn fetch_sentiment(&self) -> Result<SentimentSnapshot> {
            self.sentiment.ok_or_else(|| anyhow::anyhow!("down"))
        }
    }

    fn quote(price: f64, change: f64) -> PriceQuote {
        PriceQuote {
            ticker: "NVDA".into(),
            price: Some(price),
            change_pct: Some(change),
            volume: Some(1000.0),
            avg_volume: Some(900.0),
            origin: None,
        }
    }

    fn raw(name: &'static str, price: Option<f64>) -> Arc<dyn RawPriceSource> {
        Arc::new(Fake {
            raw: price,
            ..Fake::new(name)
        })
    }

    fn selector(quotes: Vec<Fake>, raws: Vec<Arc<dyn RawPriceSource>>) -> QuoteSelector {
        QuoteSelector::new(
            quotes
                .into_iter()
                .map(|f| Arc::new(f) as Arc<dyn QuoteSource>)
                .collect(),
            raws,
            Duration::from_millis(200),
        )
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[101.0, 99.0, 103.0]), Some(101.0));
        assert_eq!(median(&[100.0, 104.0]), Some(102.0));
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(median(&[]), None);
    }

    #[tokio::test]
    async fn top_priority_source_is_used_verbatim() {
        let a = Fake {
            quote: Some(quote(120.0, 1.5)),
            ..Fake::new("a")
        };
        let b = Fake {
            quote: Some(quote(500.0, -3.0)),
            ..Fake::new("b")
        };
        let q = selector(vec![a, b], vec![raw("r", Some(1.0))])
            .select("NVDA")
            .await;

        assert_eq!(q.price, Some(120.0));
        assert_eq!(q.change_pct, Some(1.5));
        assert_eq!(q.volume, Some(1000.0));
        assert_eq!(q.avg_volume, Some(900.0));
        assert_eq!(q.origin, Some(QuoteOrigin::Source { name: "a".into() }));
    }

    #[tokio::test]
    async fn falls_through_to_next_source() {
        let a = Fake::new("a");
        let b = Fake {
            quote: Some(quote(121.0, 0.5)),
            ..Fake::new("b")
        };
        let q = selector(vec![a, b], vec![]).select("NVDA").await;
        assert_eq!(q.price, Some(121.0));
        assert_eq!(q.origin, Some(QuoteOrigin::Source { name: "b".into() }));
    }

    #[tokio::test]
    async fn slow_source_counts_as_unavailable() {
        let a = Fake {
            quote: Some(quote(999.0, 0.0)),
            delay: Duration::from_secs(5),
            ..Fake::new("slow")
        };
        let b = Fake {
            quote: Some(quote(121.0, 0.5)),
            ..Fake::new("b")
        };
        let q = selector(vec![a, b], vec![]).select("NVDA").await;
        assert_eq!(q.price, Some(121.0));
    }

    #[tokio::test]
    async fn median_fallback_leaves_auxiliary_fields_absent() {
        let q = selector(
            vec![Fake::new("a"), Fake::new("b")],
            vec![
                raw("x", Some(101.0)),
                raw("y", Some(99.0)),
                raw("z", Some(103.0)),
                raw("down", None),
            ],
        )
        .select("NVDA")
        .await;

        assert_eq!(q.price, Some(101.0));
        assert_eq!(q.change_pct, None);
        assert_eq!(q.volume, None);
        assert_eq!(q.avg_volume, None);
        assert_eq!(q.origin, Some(QuoteOrigin::Median { count: 3 }));
    }

    #[tokio::test]
    async fn median_of_two_averages_middle_values() {
        let q = selector(
            vec![Fake::new("a")],
            vec![raw("x", Some(100.0)), raw("y", Some(104.0))],
        )
        .select("NVDA")
        .await;
        assert_eq!(q.price, Some(102.0));
    }

    #[tokio::test]
    async fn lone_fallback_price_keeps_its_source_name() {
        let q = QuoteSelector::new(
            vec![],
            vec![raw("polygon_prev", Some(101.0)), raw("down", None)],
            Duration::from_millis(200),
        )
        .select("NVDA")
        .await;

        assert_eq!(q.price, Some(101.0));
        assert_eq!(
            q.origin,
            Some(QuoteOrigin::Source {
                name: "polygon_prev".into()
            })
        );
    }

    #[tokio::test]
    async fn everything_down_yields_empty_quote() {
        let q = selector(vec![Fake::new("a")], vec![raw("x", None)])
            .select("NVDA")
            .await;
        assert_eq!(q, PriceQuote::empty("NVDA"));
    }

    #[tokio::test]
    async fn history_uses_secondary_when_primary_fails() {
        let primary = Fake::new("primary");
        let secondary = Fake {
            history: Some(HistoricalBars {
                closes: PriceSeries::new(vec![1.0, 2.0]),
                volumes: vec![],
                source: Some("secondary".into()),
            }),
            ..Fake::new("secondary")
        };
        let sel = HistoricalSelector::new(
            vec![Arc::new(primary), Arc::new(secondary)],
            Duration::from_millis(200),
        );
        let bars = sel.select("NVDA").await;
        assert_eq!(bars.source.as_deref(), Some("secondary"));

        let none = HistoricalSelector::new(vec![Arc::new(Fake::new("x"))], Duration::from_millis(200));
        assert!(none.select("NVDA").await.is_empty());
    }

    #[tokio::test]
    async fn sentiment_merges_field_wise_in_priority_order() {
        let fred = Fake {
            sentiment: Some(SentimentSnapshot {
                vix: Some(16.0),
                ..Default::default()
            }),
            ..Fake::new("fred")
        };
        let csv = Fake {
            sentiment: Some(SentimentSnapshot {
                vix: Some(30.0),
                put_call: Some(0.9),
                fear_greed: Some(55.0),
                macro_risk: None,
            }),
            ..Fake::new("csv")
        };
        let sel = SentimentSelector::new(
            vec![Arc::new(fred), Arc::new(csv), Arc::new(Fake::new("down"))],
            Duration::from_millis(200),
        );
        let s = sel.select().await;
        assert_eq!(s.vix, Some(16.0));
        assert_eq!(s.put_call, Some(0.9));
        assert_eq!(s.fear_greed, Some(55.0));
        assert_eq!(s.macro_risk, None);
    }
}
