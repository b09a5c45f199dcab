// =============================================================================
// Greeks Resolver — upstream feed first, Black-Scholes fallback
// =============================================================================
//
// Resolution order for one contract:
//   1. Ask the Greeks feed. Any answer with at least one of delta, theta or
//      gamma is used as-is (origin = Feed).
//   2. Otherwise compute European Black-Scholes Greeks (origin = Computed).
//   3. If any model input is missing, non-finite or non-positive, the result
//      is the all-absent set (origin = Unavailable).
//
// A set never mixes feed and computed values.
//
// Model conventions:
//   t     = DTE / 365
//   sigma = IV% / 100
//   theta = per calendar day (annual / 365)
//   vega  = per one volatility point (per 1 % IV)
// =============================================================================

use std::f64::consts::{PI, SQRT_2};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::sources::GreeksFeed;
use crate::symbology::option_contract_id;
use crate::types::{GreeksOrigin, GreeksSet, OptionContract, OptionType};

const DAYS_PER_YEAR: f64 = 365.0;

/// Standard normal cumulative distribution.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

/// Standard normal density.
fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes Greeks for a European option.
///
/// `iv_pct` is on the 0–100 scale, `rate` is annualised (0.05 = 5 %).
/// Returns [`GreeksSet::unavailable`] when the inputs do not define a price.
pub fn black_scholes(
    spot: f64,
    strike: f64,
    days_to_expiry: f64,
    iv_pct: f64,
    rate: f64,
    option_type: OptionType,
) -> GreeksSet {
    let inputs_ok = [spot, strike, days_to_expiry, iv_pct]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
        && rate.is_finite();
    if !inputs_ok {
        return GreeksSet::unavailable();
    }

    let t = days_to_expiry / DAYS_PER_YEAR;
    let sigma = iv_pct / 100.0;
    let sqrt_t = t.sqrt();
    let sigma_sqrt_t = sigma * sqrt_t;

    let d1 = ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * t) / sigma_sqrt_t;
    let d2 = d1 - sigma_sqrt_t;
    let pdf_d1 = norm_pdf(d1);
    let discount = (-rate * t).exp();

    let gamma = pdf_d1 / (spot * sigma_sqrt_t);
    let vega = spot * pdf_d1 * sqrt_t / 100.0;
    let decay = -spot * pdf_d1 * sigma / (2.0 * sqrt_t);

    let (delta, theta_annual) = match option_type {
        OptionType::Call => (
            norm_cdf(d1),
            decay - rate * strike * discount * norm_cdf(d2),
        ),
        OptionType::Put => (
            norm_cdf(d1) - 1.0,
            decay + rate * strike * discount * norm_cdf(-d2),
        ),
    };
    let theta = theta_annual / DAYS_PER_YEAR;

    if ![delta, gamma, theta, vega].iter().all(|v| v.is_finite()) {
        return GreeksSet::unavailable();
    }

    GreeksSet {
        delta: Some(delta),
        gamma: Some(gamma),
        theta: Some(theta),
        vega: Some(vega),
        origin: GreeksOrigin::Computed,
    }
}

// =============================================================================
// GreeksResolver
// =============================================================================

#[derive(Clone)]
pub struct GreeksResolver {
    feed: Option<Arc<dyn GreeksFeed>>,
    timeout: Duration,
    risk_free_rate: f64,
}

impl GreeksResolver {
    pub fn new(feed: Option<Arc<dyn GreeksFeed>>, timeout: Duration, risk_free_rate: f64) -> Self {
        Self {
            feed,
            timeout,
            risk_free_rate,
        }
    }

    async fn from_feed(&self, underlying: &str, contract_id: &str) -> Option<GreeksSet> {
        let feed = self.feed.as_ref()?;
        match tokio::time::timeout(self.timeout, feed.fetch_greeks(underlying, contract_id)).await {
            Ok(Ok(set)) if !set.is_core_empty() => Some(GreeksSet {
                origin: GreeksOrigin::Feed,
                ..set
            }),
            Ok(Ok(_)) => {
                debug!(contract = contract_id, "greeks feed returned no delta/theta/gamma");
                None
            }
            Ok(Err(e)) => {
                warn!(source = feed.name(), contract = contract_id, error = %e, "greeks feed unavailable");
                None
            }
            Err(_) => {
                warn!(source = feed.name(), contract = contract_id, "greeks feed timed out");
                None
            }
        }
    }

    /// Greeks for `contract` on `underlying` priced at `spot` as of `today`.
    pub async fn resolve(
        &self,
        underlying: &str,
        contract: &OptionContract,
        spot: Option<f64>,
        today: NaiveDate,
    ) -> GreeksSet {
        if let Some(expiry) = contract.expiry {
            let id = option_contract_id(underlying, expiry, contract.option_type, contract.strike);
            if let Some(set) = self.from_feed(underlying, &id).await {
                return set;
            }
        }

        let (Some(spot), Some(dte), Some(iv)) = (
            spot,
            contract.days_to_expiry(today),
            contract.implied_volatility,
        ) else {
            debug!(ticker = underlying, strike = contract.strike, "greeks inputs incomplete");
            return GreeksSet::unavailable();
        };

        let set = black_scholes(
            spot,
            contract.strike,
            dte as f64,
            iv,
            self.risk_free_rate,
            contract.option_type,
        );
        if set.origin == GreeksOrigin::Unavailable {
            debug!(ticker = underlying, strike = contract.strike, dte, iv, "black-scholes undefined");
        }
        set
    }
}
