// =============================================================================
// Shared types used across the options desk
// =============================================================================
//
// One normalized record per data kind. Every field an upstream source may
// fail to provide is an `Option`, so "unavailable" is a typed state and never
// collides with a genuine zero.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Quotes
// =============================================================================

/// Where the price inside a [`PriceQuote`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteOrigin {
    /// Taken verbatim from a single named source.
    Source { name: String },
    /// Median of raw prices from `count` (>= 2) fallback sources.
    Median { count: usize },
}

impl std::fmt::Display for QuoteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { name } => write!(f, "{name}"),
            Self::Median { count } => write!(f, "median({count})"),
        }
    }
}

/// Normalized quote for one instrument.
///
/// Invariant: `price.is_some()` implies `origin.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: String,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: Option<f64>,
    pub avg_volume: Option<f64>,
    pub origin: Option<QuoteOrigin>,
}

impl PriceQuote {
    /// The representable "no data" state: every field absent.
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            price: None,
            change_pct: None,
            volume: None,
            avg_volume: None,
            origin: None,
        }
    }

    pub fn has_price(&self) -> bool {
        self.price.is_some_and(f64::is_finite)
    }
}

// =============================================================================
// Historical series
// =============================================================================

/// Chronological (oldest first) closing prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    closes: Vec<f64>,
}

impl PriceSeries {
    /// Build a series, dropping non-finite closes.
    pub fn new(closes: Vec<f64>) -> Self {
        Self {
            closes: closes.into_iter().filter(|c| c.is_finite()).collect(),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.closes
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Closes plus daily volumes from one coherent origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBars {
    pub closes: PriceSeries,
    /// Daily volumes aligned with the bars (may be shorter when a source
    /// omits volume).
    pub volumes: Vec<f64>,
    /// Name of the source the series came from; `None` for the empty series.
    pub source: Option<String>,
}

impl HistoricalBars {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter marker used in contract symbols.
    pub fn marker(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }

    /// Parse a loosely formatted label ("call", "PUT", "c").
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Some(Self::Call),
            "put" | "p" => Some(Self::Put),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// One row of an option chain exactly as a source reported it, before
/// reconciliation. IV is in whatever convention the source uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContract {
    pub symbol: Option<String>,
    pub strike: Option<f64>,
    pub option_type: Option<OptionType>,
    pub implied_volatility: Option<f64>,
    pub expiry: Option<NaiveDate>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
}

/// A reconciled option contract. `implied_volatility` is always on the
/// 0–100 percentage scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: f64,
    pub option_type: OptionType,
    pub implied_volatility: Option<f64>,
    pub expiry: Option<NaiveDate>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
}

impl OptionContract {
    /// Mid price when both sides of the market are quoted.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Absolute bid/ask spread.
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Whole calendar days from `today` to expiry.
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry.map(|e| (e - today).num_days())
    }

    /// Price the underlying must reach at expiry to recover the premium.
    pub fn breakeven(&self) -> Option<f64> {
        let mid = self.mid()?;
        Some(match self.option_type {
            OptionType::Call => self.strike + mid,
            OptionType::Put => self.strike - mid,
        })
    }
}

// =============================================================================
// Greeks
// =============================================================================

/// How a [`GreeksSet`] was obtained. A set is never a mix of origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreeksOrigin {
    Feed,
    Computed,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreeksSet {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub origin: GreeksOrigin,
}

impl GreeksSet {
    /// The all-absent terminal state.
    pub fn unavailable() -> Self {
        Self {
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            origin: GreeksOrigin::Unavailable,
        }
    }

    /// True when none of delta, theta or gamma is present. Vega alone does
    /// not make a feed answer usable.
    pub fn is_core_empty(&self) -> bool {
        self.delta.is_none() && self.theta.is_none() && self.gamma.is_none()
    }
}

// =============================================================================
// Sentiment
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub vix: Option<f64>,
    pub put_call: Option<f64>,
    pub fear_greed: Option<f64>,
    pub macro_risk: Option<f64>,
}

impl SentimentSnapshot {
    /// Fill every absent field from `other`, keeping fields already present.
    pub fn fill_from(&mut self, other: &SentimentSnapshot) {
        self.vix = self.vix.or(other.vix);
        self.put_call = self.put_call.or(other.put_call);
        self.fear_greed = self.fear_greed.or(other.fear_greed);
        self.macro_risk = self.macro_risk.or(other.macro_risk);
    }

    pub fn is_complete(&self) -> bool {
        self.vix.is_some()
            && self.put_call.is_some()
            && self.fear_greed.is_some()
            && self.macro_risk.is_some()
    }
}
