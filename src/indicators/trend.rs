// =============================================================================
// Moving-average trend stack
// =============================================================================
//
//   Bullish  when EMA20 > EMA50 > SMA200
//   Bearish  when EMA20 < EMA50 < SMA200
//   Neutral  otherwise
//
// Undefined (None) as soon as one of the three averages is missing.
// =============================================================================

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for MaTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "Bullish"),
            Self::Bearish => write!(f, "Bearish"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}

pub fn ma_trend(ema20: Option<f64>, ema50: Option<f64>, sma200: Option<f64>) -> Option<MaTrend> {
    let (e20, e50, s200) = (ema20?, ema50?, sma200?);
    Some(if e20 > e50 && e50 > s200 {
        MaTrend::Bullish
    } else if e20 < e50 && e50 < s200 {
        MaTrend::Bearish
    } else {
        MaTrend::Neutral
    })
}
