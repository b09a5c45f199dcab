// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the desk scores
// on. Every public function returns `Option<T>` so callers are forced to
// handle insufficient-data and numerical-edge-case scenarios.
//
// Minimum closes: EMA20 -> 20, EMA50 -> 50, SMA200 -> 200, RSI14 -> 14,
// MACD(12,26,9) -> 26. Below that the reading is absent.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod trend;
pub mod volume;

pub use ema::ema;
pub use macd::{macd, standard_macd, MacdReading};
pub use rsi::rsi;
pub use sma::sma;
pub use trend::{ma_trend, MaTrend};
pub use volume::{latest_volume, trailing_average_volume, volume_ratio, AVERAGE_VOLUME_WINDOW};

use serde::Serialize;

use crate::types::{HistoricalBars, PriceQuote};

pub const RSI_PERIOD: usize = 14;

/// Every indicator reading for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub sma200: Option<f64>,
    pub trend: Option<MaTrend>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdReading>,
    pub volume: Option<f64>,
    pub avg_volume: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compute from the selected history. Volume statistics prefer the
    /// history and fall back to the quote's own fields.
    pub fn compute(bars: &HistoricalBars, quote: &PriceQuote) -> Self {
        let closes = bars.closes.as_slice();

        let ema20 = ema(closes, 20);
        let ema50 = ema(closes, 50);
        let sma200 = sma(closes, 200);

        let volume = latest_volume(&bars.volumes).or(quote.volume);
        let avg_volume =
            trailing_average_volume(&bars.volumes, AVERAGE_VOLUME_WINDOW).or(quote.avg_volume);

        Self {
            ema20,
            ema50,
            sma200,
            trend: ma_trend(ema20, ema50, sma200),
            rsi: rsi(closes, RSI_PERIOD),
            macd: standard_macd(closes),
            volume,
            avg_volume,
            volume_ratio: volume.map(|v| volume_ratio(v, avg_volume)),
        }
    }

    pub fn macd_rising(&self) -> bool {
        self.macd.is_some_and(|m| m.is_rising())
    }
}
