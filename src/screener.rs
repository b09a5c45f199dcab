// =============================================================================
// Contract Screener — short list of tradeable near-the-money calls
// =============================================================================
//
// Filters applied in order over a reconciled multi-expiry chain:
//   1. calls with both bid and ask quoted
//   2. DTE within [21, 30]
//   3. strike within two strike steps of the underlying (step = median gap
//      between listed strikes, 5 when it cannot be measured); skipped when
//      the underlying price is unknown
//   4. delta, theta, gamma, IV and open-interest bands
//   5. relative spread (ask - bid) / mid <= 5 %
// Survivors are ranked by open interest; the top three are returned.
// =============================================================================

use chrono::NaiveDate;
use serde::Serialize;

use crate::selector::median;
use crate::types::{OptionContract, OptionType};

const DEFAULT_STRIKE_STEP: f64 = 5.0;
const STRIKE_STEPS: f64 = 2.0;
const SHORTLIST_LEN: usize = 3;

/// Index ETFs held to the stricter open-interest floor.
const INDEX_ETFS: [&str; 2] = ["SPY", "QQQ"];

#[derive(Debug, Clone, Copy)]
pub struct ScreenerRules {
    pub dte: (i64, i64),
    pub delta: (f64, f64),
    pub min_theta: f64,
    pub gamma: (f64, f64),
    /// Percentage scale.
    pub iv: (f64, f64),
    pub min_open_interest: f64,
    pub min_open_interest_index: f64,
    pub max_spread_pct: f64,
}

impl Default for ScreenerRules {
    fn default() -> Self {
        Self {
            dte: (21, 30),
            delta: (0.45, 0.60),
            min_theta: -0.03,
            gamma: (0.005, 0.015),
            iv: (20.0, 55.0),
            min_open_interest: 1_000.0,
            min_open_interest_index: 5_000.0,
            max_spread_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenedContract {
    #[serde(flatten)]
    pub contract: OptionContract,
    pub dte: i64,
    pub spread_pct: f64,
}

fn within(value: Option<f64>, (lo, hi): (f64, f64)) -> bool {
    value.is_some_and(|v| (lo..=hi).contains(&v))
}

/// Median gap between consecutive distinct strikes.
fn strike_step(contracts: &[&OptionContract]) -> f64 {
    let mut strikes: Vec<f64> = contracts.iter().map(|c| c.strike).collect();
    strikes.sort_by(f64::total_cmp);
    strikes.dedup();
    let gaps: Vec<f64> = strikes.windows(2).map(|w| w[1] - w[0]).collect();
    median(&gaps)
        .filter(|g| *g > 0.0)
        .unwrap_or(DEFAULT_STRIKE_STEP)
}

pub fn shortlist(
    ticker: &str,
    chain: &[OptionContract],
    spot: Option<f64>,
    today: NaiveDate,
    rules: &ScreenerRules,
) -> Vec<ScreenedContract> {
    let in_window: Vec<&OptionContract> = chain
        .iter()
        .filter(|c| c.option_type == OptionType::Call && c.bid.is_some() && c.ask.is_some())
        .filter(|c| {
            c.days_to_expiry(today)
                .is_some_and(|d| (rules.dte.0..=rules.dte.1).contains(&d))
        })
        .collect();

    let near: Vec<&OptionContract> = match spot.filter(|s| s.is_finite()) {
        Some(spot) => {
            let reach = STRIKE_STEPS * strike_step(&in_window);
            in_window
                .into_iter()
                .filter(|c| (c.strike - spot).abs() <= reach)
                .collect()
        }
        None => in_window,
    };

    let min_oi = if INDEX_ETFS.contains(&ticker.to_uppercase().as_str()) {
        rules.min_open_interest_index
    } else {
        rules.min_open_interest
    };

    let mut picks: Vec<ScreenedContract> = near
        .into_iter()
        .filter(|c| within(c.delta, rules.delta))
        .filter(|c| c.theta.is_some_and(|t| t >= rules.min_theta))
        .filter(|c| within(c.gamma, rules.gamma))
        .filter(|c| within(c.implied_volatility, rules.iv))
        .filter(|c| c.open_interest.is_some_and(|oi| oi >= min_oi))
        .filter_map(|c| {
            let mid = c.mid().filter(|m| *m > 0.0)?;
            let spread_pct = c.spread()? / mid;
            (spread_pct <= rules.max_spread_pct).then(|| ScreenedContract {
                contract: c.clone(),
                dte: c.days_to_expiry(today).unwrap_or_default(),
                spread_pct,
            })
        })
        .collect();

    picks.sort_by(|a, b| {
        b.contract
            .open_interest
            .unwrap_or(0.0)
            .total_cmp(&a.contract.open_interest.unwrap_or(0.0))
    });
    picks.truncate(SHORTLIST_LEN);
    picks
}
