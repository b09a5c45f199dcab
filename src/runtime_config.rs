// =============================================================================
// Runtime Configuration — JSON settings with serde defaults
// =============================================================================
//
// Every tunable of the desk lives here: the watched tickers, the source
// priority order, timeouts, the two cache TTL classes, and the scoring
// thresholds. All fields carry `#[serde(default)]` so adding a field never
// breaks loading an older config file.
//
// Credentials are deliberately NOT part of the JSON document; they are read
// from the process environment by [`Credentials::from_env`].
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signals::CompositeWeights;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tickers() -> Vec<String> {
    ["NVDA", "TSLA", "AMD", "META", "SPY", "QQQ"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_quote_priority() -> Vec<String> {
    vec!["polygon".into(), "yahoo".into(), "csv".into()]
}

fn default_adapter_timeout_ms() -> u64 {
    8_000
}

fn default_market_ttl_secs() -> u64 {
    60
}

fn default_sentiment_ttl_secs() -> u64 {
    300
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_stream_buffer_capacity() -> usize {
    100
}

fn default_stream_join_timeout_ms() -> u64 {
    2_000
}

fn default_polygon_base_url() -> String {
    "https://api.polygon.io".into()
}

fn default_polygon_ws_url() -> String {
    "wss://delayed.polygon.io/options".into()
}

fn default_yahoo_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_fred_base_url() -> String {
    "https://api.stlouisfed.org".into()
}

fn default_prices_csv() -> String {
    "prices.csv".into()
}

fn default_sentiment_csv() -> String {
    "sentiment.csv".into()
}

fn default_chain_max_pages() -> usize {
    10
}

fn default_delta_band() -> (f64, f64) {
    (0.45, 0.60)
}

fn default_delta_penalty_low() -> f64 {
    0.35
}

fn default_delta_penalty_high() -> f64 {
    0.70
}

fn default_roll_theta() -> f64 {
    -0.15
}

fn default_roll_dte() -> i64 {
    7
}

fn default_dte_penalty_days() -> i64 {
    7
}

fn default_buy_threshold() -> i64 {
    75
}

fn default_hold_threshold() -> i64 {
    60
}

fn default_watch_threshold() -> i64 {
    45
}

// =============================================================================
// ScoringParams
// =============================================================================

/// Thresholds of the scoring and signal engine that are configuration rather
/// than hard invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Inclusive delta band rewarded with +20.
    #[serde(default = "default_delta_band")]
    pub delta_band: (f64, f64),

    /// Delta below this is penalised.
    #[serde(default = "default_delta_penalty_low")]
    pub delta_penalty_low: f64,

    /// Delta above this is penalised.
    #[serde(default = "default_delta_penalty_high")]
    pub delta_penalty_high: f64,

    /// Theta strictly below this triggers the ROLL flag on BUY/HOLD.
    #[serde(default = "default_roll_theta")]
    pub roll_theta: f64,

    /// Days-to-expiry strictly below this triggers the ROLL flag on BUY/HOLD.
    #[serde(default = "default_roll_dte")]
    pub roll_dte: i64,

    /// Days-to-expiry strictly below this scores -20 instead of the linear
    /// DTE term.
    #[serde(default = "default_dte_penalty_days")]
    pub dte_penalty_days: i64,

    /// Weights of the composite blend.
    #[serde(default)]
    pub weights: CompositeWeights,

    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: i64,

    #[serde(default = "default_hold_threshold")]
    pub hold_threshold: i64,

    #[serde(default = "default_watch_threshold")]
    pub watch_threshold: i64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            delta_band: default_delta_band(),
            delta_penalty_low: default_delta_penalty_low(),
            delta_penalty_high: default_delta_penalty_high(),
            roll_theta: default_roll_theta(),
            roll_dte: default_roll_dte(),
            dte_penalty_days: default_dte_penalty_days(),
            weights: CompositeWeights::default(),
            buy_threshold: default_buy_threshold(),
            hold_threshold: default_hold_threshold(),
            watch_threshold: default_watch_threshold(),
        }
    }
}

// =============================================================================
// Upstream endpoints
// =============================================================================

/// Base URLs and local paths for every adapter. Overridable so tests can
/// point the adapters at a local mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_polygon_base_url")]
    pub polygon_base_url: String,

    #[serde(default = "default_polygon_ws_url")]
    pub polygon_ws_url: String,

    #[serde(default = "default_yahoo_base_url")]
    pub yahoo_base_url: String,

    #[serde(default = "default_fred_base_url")]
    pub fred_base_url: String,

    #[serde(default = "default_prices_csv")]
    pub prices_csv: String,

    #[serde(default = "default_sentiment_csv")]
    pub sentiment_csv: String,

    /// Upper bound on `next_url` pages followed for one chain snapshot.
    #[serde(default = "default_chain_max_pages")]
    pub chain_max_pages: usize,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            polygon_base_url: default_polygon_base_url(),
            polygon_ws_url: default_polygon_ws_url(),
            yahoo_base_url: default_yahoo_base_url(),
            fred_base_url: default_fred_base_url(),
            prices_csv: default_prices_csv(),
            sentiment_csv: default_sentiment_csv(),
            chain_max_pages: default_chain_max_pages(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the desk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Instruments evaluated on every refresh.
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,

    /// Named quote sources, most trusted first.
    #[serde(default = "default_quote_priority")]
    pub quote_priority: Vec<String>,

    /// Wall-clock budget for a single adapter call; slower means unavailable.
    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,

    /// TTL for quotes, historicals and chains.
    #[serde(default = "default_market_ttl_secs")]
    pub market_ttl_secs: u64,

    /// TTL for macro sentiment.
    #[serde(default = "default_sentiment_ttl_secs")]
    pub sentiment_ttl_secs: u64,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Annualised risk-free rate for the Black-Scholes fallback (0.05 = 5 %).
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    #[serde(default = "default_stream_buffer_capacity")]
    pub stream_buffer_capacity: usize,

    /// How long a stream switch waits for the old worker before moving on.
    #[serde(default = "default_stream_join_timeout_ms")]
    pub stream_join_timeout_ms: u64,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub scoring: ScoringParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            quote_priority: default_quote_priority(),
            adapter_timeout_ms: default_adapter_timeout_ms(),
            market_ttl_secs: default_market_ttl_secs(),
            sentiment_ttl_secs: default_sentiment_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            risk_free_rate: default_risk_free_rate(),
            stream_buffer_capacity: default_stream_buffer_capacity(),
            stream_join_timeout_ms: default_stream_join_timeout_ms(),
            endpoints: Endpoints::default(),
            scoring: ScoringParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            tickers = ?config.tickers,
            priority = ?config.quote_priority,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply `OPTIONS_DESK_TICKERS` (comma-separated) on top of the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("OPTIONS_DESK_TICKERS") {
            self.apply_ticker_override(&raw);
        }
    }

    fn apply_ticker_override(&mut self, raw: &str) {
        let tickers: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !tickers.is_empty() {
            self.tickers = tickers;
        }
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn market_ttl(&self) -> Duration {
        Duration::from_secs(self.market_ttl_secs)
    }

    pub fn sentiment_ttl(&self) -> Duration {
        Duration::from_secs(self.sentiment_ttl_secs)
    }

    pub fn stream_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_join_timeout_ms)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// API keys, opaque to the core. A missing key degrades the adapters that
/// need it to "unavailable".
#[derive(Clone, Default)]
pub struct Credentials {
    pub polygon_api_key: Option<String>,
    pub fred_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            polygon_api_key: non_empty_env("POLYGON_API_KEY"),
            fred_api_key: non_empty_env("FRED_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("polygon_api_key", &self.polygon_api_key.as_ref().map(|_| "<set>"))
            .field("fred_api_key", &self.fred_api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.tickers.len(), 6);
        assert_eq!(cfg.tickers[0], "NVDA");
        assert_eq!(cfg.quote_priority, vec!["polygon", "yahoo", "csv"]);
        assert_eq!(cfg.market_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.sentiment_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.stream_buffer_capacity, 100);
        assert!((cfg.risk_free_rate - 0.05).abs() < f64::EPSILON);
        assert!((cfg.scoring.roll_theta + 0.15).abs() < f64::EPSILON);
        assert_eq!(cfg.scoring.buy_threshold, 75);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.refresh_interval_secs, 60);
        assert_eq!(cfg.endpoints.polygon_base_url, "https://api.polygon.io");
        assert_eq!(cfg.scoring.delta_band, (0.45, 0.60));
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "tickers": ["SPY"], "scoring": { "roll_theta": -0.2 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.tickers, vec!["SPY"]);
        assert!((cfg.scoring.roll_theta + 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.scoring.hold_threshold, 60);
        assert_eq!(cfg.adapter_timeout_ms, 8_000);
    }

    #[test]
    fn ticker_override_normalises_and_ignores_blanks() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_ticker_override(" spy, ,qqq ");
        assert_eq!(cfg.tickers, vec!["SPY", "QQQ"]);

        cfg.apply_ticker_override(" , ");
        assert_eq!(cfg.tickers, vec!["SPY", "QQQ"]);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(RuntimeConfig::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn credentials_debug_hides_values() {
        let creds = Credentials {
            polygon_api_key: Some("secret".into()),
            fred_api_key: None,
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<set>"));
    }
}
