// =============================================================================
// Sub-scores — technical, Greeks, sentiment, days-to-expiry
// =============================================================================
//
// Each sub-score is a pure function of its inputs. An absent input adds
// nothing to its term; it never turns the score itself into "absent".
//
// Technical (floor 0):
//   +20 bullish stack / -20 bearish stack
//   + clamp((RSI - 50) / 2, 0, 15)
//   +10 MACD rising
//   +15 volume ratio >= 1.5
//
// Greeks (floor 0):
//   +20 delta inside the band / -10 delta beyond the penalty bounds
//   + max(10 + theta, 0)
//   +5  gamma > 0
//   +10 week-over-week IV change >= 0.10
//   -10 bid/ask spread > 0.10
//
// Sentiment:  trunc(0.3 VIX + 0.3 PutCall + 0.3 FearGreed + 0.1 MacroRisk)
// DTE:        -20 below the roll DTE, else floor(10 * DTE / 30)
// =============================================================================

use serde::Serialize;

use crate::indicators::volume::VOLUME_SURGE_RATIO;
use crate::indicators::MaTrend;
use crate::runtime_config::ScoringParams;
use crate::types::SentimentSnapshot;

const IV_JUMP: f64 = 0.10;
const WIDE_SPREAD: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TechnicalInputs {
    pub trend: Option<MaTrend>,
    pub rsi: Option<f64>,
    pub macd_rising: bool,
    pub volume_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GreeksInputs {
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub gamma: Option<f64>,
    /// Fractional change of IV over the past week (0.10 = +10 %).
    pub iv_week_change: Option<f64>,
    /// Absolute ask - bid.
    pub spread: Option<f64>,
}

pub fn technical_score(inputs: &TechnicalInputs) -> f64 {
    let mut score = match inputs.trend {
        Some(MaTrend::Bullish) => 20.0,
        Some(MaTrend::Bearish) => -20.0,
        _ => 0.0,
    };

    if let Some(rsi) = inputs.rsi {
        score += ((rsi - 50.0) / 2.0).clamp(0.0, 15.0);
    }
    if inputs.macd_rising {
        score += 10.0;
    }
    if inputs.volume_ratio.is_some_and(|r| r >= VOLUME_SURGE_RATIO) {
        score += 15.0;
    }

    score.max(0.0)
}

pub fn greeks_score(inputs: &GreeksInputs, params: &ScoringParams) -> f64 {
    let mut score = 0.0;

    if let Some(delta) = inputs.delta {
        let (lo, hi) = params.delta_band;
        if (lo..=hi).contains(&delta) {
            score += 20.0;
        } else if delta < params.delta_penalty_low || delta > params.delta_penalty_high {
            score -= 10.0;
        }
    }
    if let Some(theta) = inputs.theta {
        score += (10.0 + theta).max(0.0);
    }
    if inputs.gamma.is_some_and(|g| g > 0.0) {
        score += 5.0;
    }
    if inputs.iv_week_change.is_some_and(|c| c >= IV_JUMP) {
        score += 10.0;
    }
    if inputs.spread.is_some_and(|s| s > WIDE_SPREAD) {
        score -= 10.0;
    }

    score.max(0.0)
}

pub fn sentiment_score(s: &SentimentSnapshot) -> i64 {
    let raw = 0.3 * s.vix.unwrap_or(0.0)
        + 0.3 * s.put_call.unwrap_or(0.0)
        + 0.3 * s.fear_greed.unwrap_or(0.0)
        + 0.1 * s.macro_risk.unwrap_or(0.0);
    raw.trunc() as i64
}

/// Days-to-expiry score; an unknown DTE contributes 0.
pub fn dte_score(dte: Option<i64>, params: &ScoringParams) -> i64 {
    match dte {
        None => 0,
        Some(d) if d < params.dte_penalty_days => -20,
        Some(d) => (10 * d).div_euclid(30),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScoringParams {
        ScoringParams::default()
    }

    #[test]
    fn technical_full_marks() {
        let s = technical_score(&TechnicalInputs {
            trend: Some(MaTrend::Bullish),
            rsi: Some(90.0),
            macd_rising: true,
            volume_ratio: Some(1.5),
        });
        assert_eq!(s, 60.0);
    }

    #[test]
    fn technical_rsi_term_is_clamped() {
        let with_rsi = |rsi| {
            technical_score(&TechnicalInputs {
                rsi: Some(rsi),
                ..Default::default()
            })
        };
        assert_eq!(with_rsi(40.0), 0.0);
        assert_eq!(with_rsi(60.0), 5.0);
        assert_eq!(with_rsi(100.0), 15.0);
    }

    #[test]
    fn technical_never_negative() {
        let s = technical_score(&TechnicalInputs {
            trend: Some(MaTrend::Bearish),
            rsi: Some(20.0),
            macd_rising: false,
            volume_ratio: Some(0.2),
        });
        assert_eq!(s, 0.0);
        assert_eq!(technical_score(&TechnicalInputs::default()), 0.0);
    }

    #[test]
    fn greeks_ideal_contract() {
        let s = greeks_score(
            &GreeksInputs {
                delta: Some(0.5),
                theta: Some(-0.05),
                gamma: Some(0.01),
                iv_week_change: Some(0.12),
                spread: Some(0.05),
            },
            &params(),
        );
        assert!((s - (20.0 + 9.95 + 5.0 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn greeks_penalties_and_floor() {
        let s = greeks_score(
            &GreeksInputs {
                delta: Some(0.9),
                theta: Some(-12.0),
                gamma: Some(0.0),
                iv_week_change: None,
                spread: Some(0.5),
            },
            &params(),
        );
        assert_eq!(s, 0.0);

        // Between band and penalty bounds: neither bonus nor penalty.
        let s = greeks_score(
            &GreeksInputs {
                delta: Some(0.40),
                ..Default::default()
            },
            &params(),
        );
        assert_eq!(s, 0.0);
    }

    #[test]
    fn greeks_absent_theta_adds_nothing() {
        let s = greeks_score(
            &GreeksInputs {
                delta: Some(0.5),
                ..Default::default()
            },
            &params(),
        );
        assert_eq!(s, 20.0);
    }

    #[test]
    fn sentiment_weights_and_truncation() {
        let s = SentimentSnapshot {
            vix: Some(20.0),
            put_call: Some(1.0),
            fear_greed: Some(50.0),
            macro_risk: Some(35.0),
        };
        // 6 + 0.3 + 15 + 3.5 = 24.8
        assert_eq!(sentiment_score(&s), 24);
        assert_eq!(sentiment_score(&SentimentSnapshot::default()), 0);
    }

    #[test]
    fn dte_score_values() {
        let p = params();
        assert_eq!(dte_score(Some(3), &p), -20);
        assert_eq!(dte_score(Some(-1), &p), -20);
        assert_eq!(dte_score(Some(7), &p), 2);
        assert_eq!(dte_score(Some(30), &p), 10);
        assert_eq!(dte_score(Some(45), &p), 15);
        assert_eq!(dte_score(None, &p), 0);
    }

    #[test]
    fn dte_penalty_is_independent_of_roll_window() {
        let p = ScoringParams {
            roll_dte: 30,
            ..params()
        };
        assert_eq!(dte_score(Some(10), &p), 3);

        let p = ScoringParams {
            dte_penalty_days: 14,
            ..params()
        };
        assert_eq!(dte_score(Some(10), &p), -20);
    }
}
