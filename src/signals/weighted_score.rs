// =============================================================================
// Composite Scorer — weighted blend of the four sub-scores
// =============================================================================
//
//   composite = floor(0.35 technical + 0.35 greeks + 0.20 sentiment + 0.10 dte)
//
// The weights above are the defaults; `ScoringParams::weights` overrides them.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Weights of the composite blend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub technical: f64,
    pub greeks: f64,
    pub sentiment: f64,
    pub dte: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            technical: 0.35,
            greeks: 0.35,
            sentiment: 0.20,
            dte: 0.10,
        }
    }
}

/// The four sub-scores plus the composite they produce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub technical: f64,
    pub greeks: f64,
    pub sentiment: i64,
    pub dte: i64,
    pub composite: i64,
}

impl ScoreBreakdown {
    pub fn new(
        technical: f64,
        greeks: f64,
        sentiment: i64,
        dte: i64,
        weights: &CompositeWeights,
    ) -> Self {
        Self {
            technical,
            greeks,
            sentiment,
            dte,
            composite: weighted_composite(technical, greeks, sentiment, dte, weights),
        }
    }
}

pub fn composite_score(technical: f64, greeks: f64, sentiment: i64, dte: i64) -> i64 {
    weighted_composite(technical, greeks, sentiment, dte, &CompositeWeights::default())
}

fn weighted_composite(
    technical: f64,
    greeks: f64,
    sentiment: i64,
    dte: i64,
    w: &CompositeWeights,
) -> i64 {
    let total = w.technical * technical
        + w.greeks * greeks
        + w.sentiment * sentiment as f64
        + w.dte * dte as f64;
    total.floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_blend() {
        // 0.35*60 + 0.35*45 + 0.2*24 + 0.1*10 = 21 + 15.75 + 4.8 + 1 = 42.55
        assert_eq!(composite_score(60.0, 45.0, 24, 10), 42);
    }

    #[test]
    fn composite_floors_negative_totals() {
        // 0.1 * -20 = -2.0 exactly; 0.35 * 1 - 2 = -1.65 -> -2
        assert_eq!(composite_score(0.0, 0.0, 0, -20), -2);
        assert_eq!(composite_score(1.0, 0.0, 0, -20), -2);
    }

    #[test]
    fn breakdown_carries_composite() {
        let b = ScoreBreakdown::new(100.0, 100.0, 100, 10, &CompositeWeights::default());
        // 35 + 35 + 20 + 1
        assert_eq!(b.composite, 91);
    }

    #[test]
    fn configured_weights_change_the_blend() {
        let w: CompositeWeights =
            serde_json::from_str(r#"{ "technical": 1.0, "greeks": 0.0 }"#).unwrap();
        assert_eq!(w.sentiment, 0.20);
        let b = ScoreBreakdown::new(60.0, 45.0, 24, 10, &w);
        // 60 + 0 + 4.8 + 1
        assert_eq!(b.composite, 65);
    }
}
