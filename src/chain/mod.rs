// =============================================================================
// Option Chain Reconciler
// =============================================================================
//
// Outer-joins the chains of two sources on (strike, type):
//
//   - rows keep the first source's order; rows only the second source knows
//     follow in its order
//   - IV: mean of both normalized values when both report, else whichever
//     reports, else absent
//   - every other field (expiry, quotes, OI, Greeks) prefers the first source
//     and falls back to the second
//
// With a single source its normalized chain is used as-is.
// =============================================================================

pub mod normalize;

pub use normalize::{normalize_contract, normalize_iv, option_type_from_symbol};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::sources::ChainSource;
use crate::types::{OptionContract, OptionType, RawContract};

/// Join key: strike in thousandths (exact for listed strikes) and type.
type ContractKey = (i64, OptionType);

fn contract_key(c: &OptionContract) -> ContractKey {
    ((c.strike * 1000.0).round() as i64, c.option_type)
}

fn merge_iv(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

fn merge_pair(first: &OptionContract, second: &OptionContract) -> OptionContract {
    OptionContract {
        strike: first.strike,
        option_type: first.option_type,
        implied_volatility: merge_iv(first.implied_volatility, second.implied_volatility),
        expiry: first.expiry.or(second.expiry),
        bid: first.bid.or(second.bid),
        ask: first.ask.or(second.ask),
        open_interest: first.open_interest.or(second.open_interest),
        delta: first.delta.or(second.delta),
        theta: first.theta.or(second.theta),
        gamma: first.gamma.or(second.gamma),
        vega: first.vega.or(second.vega),
    }
}

/// Reconcile two raw chains into one normalized table.
pub fn reconcile_chains(first: &[RawContract], second: &[RawContract]) -> Vec<OptionContract> {
    let first: Vec<OptionContract> = first.iter().filter_map(normalize_contract).collect();
    let second: Vec<OptionContract> = second.iter().filter_map(normalize_contract).collect();

    if second.is_empty() {
        return first;
    }
    if first.is_empty() {
        return second;
    }

    let mut by_key: HashMap<ContractKey, usize> = HashMap::with_capacity(second.len());
    for (i, c) in second.iter().enumerate() {
        by_key.entry(contract_key(c)).or_insert(i);
    }

    let mut matched = vec![false; second.len()];
    let mut merged = Vec::with_capacity(first.len() + second.len());

    for c in &first {
        match by_key.get(&contract_key(c)) {
            Some(&i) => {
                matched[i] = true;
                merged.push(merge_pair(c, &second[i]));
            }
            None => merged.push(c.clone()),
        }
    }

    merged.extend(
        second
            .into_iter()
            .zip(matched)
            .filter(|(_, used)| !used)
            .map(|(c, _)| c),
    );
    merged
}

/// The contract whose strike is closest to `spot`; ties keep the earlier row.
pub fn atm_contract<'a, I>(contracts: I, spot: f64) -> Option<&'a OptionContract>
where
    I: IntoIterator<Item = &'a OptionContract>,
{
    if !spot.is_finite() {
        return None;
    }
    let mut best: Option<(&OptionContract, f64)> = None;
    for c in contracts {
        let dist = (c.strike - spot).abs();
        match best {
            Some((_, d)) if dist >= d => {}
            _ => best = Some((c, dist)),
        }
    }
    best.map(|(c, _)| c)
}

/// Earliest expiry on or after `today` in a raw chain.
fn nearest_expiry(rows: &[RawContract], today: NaiveDate) -> Option<NaiveDate> {
    rows.iter().filter_map(|r| r.expiry).filter(|e| *e >= today).min()
}

fn retain_expiry(rows: &mut Vec<RawContract>, expiry: Option<NaiveDate>) {
    if let Some(e) = expiry {
        rows.retain(|r| r.expiry.map_or(true, |x| x == e));
    }
}

// =============================================================================
// ChainAssembler — fetch from the chain sources and reconcile
// =============================================================================

/// Fetches raw chains from up to two sources and reconciles them. Fetch
/// failures are logged and treated as an empty chain.
#[derive(Clone)]
pub struct ChainAssembler {
    first: Option<Arc<dyn ChainSource>>,
    second: Option<Arc<dyn ChainSource>>,
    timeout: Duration,
}

impl ChainAssembler {
    pub fn new(
        first: Option<Arc<dyn ChainSource>>,
        second: Option<Arc<dyn ChainSource>>,
        timeout: Duration,
    ) -> Self {
        Self {
            first,
            second,
            timeout,
        }
    }

    pub fn identity(&self) -> String {
        let names: Vec<&str> = self
            .first
            .iter()
            .chain(self.second.iter())
            .map(|s| s.name())
            .collect();
        names.join("+")
    }

    async fn fetch(
        &self,
        source: &Option<Arc<dyn ChainSource>>,
        ticker: &str,
        expiry: Option<NaiveDate>,
    ) -> Vec<RawContract> {
        let Some(src) = source else {
            return Vec::new();
        };
        match tokio::time::timeout(self.timeout, src.fetch_chain(ticker, expiry)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!(source = src.name(), ticker, error = %e, "chain source unavailable");
                Vec::new()
            }
            Err(_) => {
                warn!(source = src.name(), ticker, "chain source timed out");
                Vec::new()
            }
        }
    }

    /// Reconciled chain for the nearest listed expiry. The first source picks
    /// the expiry; the second is asked for that same expiry.
    pub async fn nearest_expiry_chain(&self, ticker: &str, today: NaiveDate) -> Vec<OptionContract> {
        let mut first = self.fetch(&self.first, ticker, None).await;
        let hint = nearest_expiry(&first, today);
        let mut second = self.fetch(&self.second, ticker, hint).await;

        let target = hint.or_else(|| nearest_expiry(&second, today));
        retain_expiry(&mut first, target);
        retain_expiry(&mut second, target);

        let chain = reconcile_chains(&first, &second);
        debug!(ticker, expiry = ?target, contracts = chain.len(), "chain reconciled");
        chain
    }

    /// Every listed expiry, as the screener needs. Prefers the second source,
    /// whose snapshot spans expiries; falls back to the first.
    pub async fn all_expiries_chain(&self, ticker: &str) -> Vec<OptionContract> {
        let rows = self.fetch(&self.second, ticker, None).await;
        let rows = if rows.is_empty() {
            self.fetch(&self.first, ticker, None).await
        } else {
            rows
        };
        reconcile_chains(&rows, &[])
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::DataSource;
    use async_trait::async_trait;

    fn raw(strike: f64, ty: OptionType, iv: Option<f64>) -> RawContract {
        RawContract {
            strike: Some(strike),
            option_type: Some(ty),
            implied_volatility: iv,
            expiry: NaiveDate::from_ymd_opt(2025, 1, 17),
            ..RawContract::default()
        }
    }

    #[test]
    fn outer_join_averages_iv_and_keeps_one_sided_rows() {
        let a = vec![
            raw(100.0, OptionType::Call, Some(0.40)),
            raw(105.0, OptionType::Call, Some(0.50)),
        ];
        let mut b_row = raw(100.0, OptionType::Call, Some(44.0));
        b_row.delta = Some(0.55);
        let b = vec![b_row, raw(110.0, OptionType::Call, None)];

        let merged = reconcile_chains(&a, &b);
        assert_eq!(merged.len(), 3);

        assert_eq!(merged[0].strike, 100.0);
        assert!((merged[0].implied_volatility.unwrap() - 42.0).abs() < 1e-9);
        assert_eq!(merged[0].delta, Some(0.55));

        // Only in A: no Greek fields from B.
        assert_eq!(merged[1].strike, 105.0);
        assert_eq!(merged[1].implied_volatility, Some(50.0));
        assert_eq!(merged[1].delta, None);

        // Only in B, appended after A's rows.
        assert_eq!(merged[2].strike, 110.0);
        assert_eq!(merged[2].implied_volatility, None);
    }

    #[test]
    fn calls_and_puts_at_same_strike_do_not_merge() {
        let a = vec![raw(100.0, OptionType::Call, Some(0.3))];
        let b = vec![raw(100.0, OptionType::Put, Some(0.5))];
        let merged = reconcile_chains(&a, &b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].implied_volatility, Some(30.0));
        assert_eq!(merged[1].implied_volatility, Some(50.0));
    }

    #[test]
    fn expiry_prefers_first_source() {
        let mut a = raw(100.0, OptionType::Call, None);
        a.expiry = None;
        let mut b = raw(100.0, OptionType::Call, None);
        b.expiry = NaiveDate::from_ymd_opt(2025, 2, 21);
        let merged = reconcile_chains(&[a.clone()], &[b.clone()]);
        assert_eq!(merged[0].expiry, NaiveDate::from_ymd_opt(2025, 2, 21));

        a.expiry = NaiveDate::from_ymd_opt(2025, 1, 17);
        let merged = reconcile_chains(&[a], &[b]);
        assert_eq!(merged[0].expiry, NaiveDate::from_ymd_opt(2025, 1, 17));
    }

    #[test]
    fn single_source_chain_is_normalized_only() {
        let b = vec![
            RawContract {
                strike: Some(50.0),
                symbol: Some("AMD250117C00050000".into()),
                implied_volatility: Some(0.25),
                ..RawContract::default()
            },
            RawContract {
                strike: None,
                option_type: Some(OptionType::Call),
                ..RawContract::default()
            },
        ];
        let merged = reconcile_chains(&[], &b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].option_type, OptionType::Call);
        assert_eq!(merged[0].implied_volatility, Some(25.0));
    }

    #[test]
    fn atm_picks_closest_strike_first_on_ties() {
        let chain = reconcile_chains(
            &[
                raw(95.0, OptionType::Call, None),
                raw(105.0, OptionType::Call, None),
                raw(110.0, OptionType::Call, None),
            ],
            &[],
        );
        assert_eq!(atm_contract(&chain, 100.0).unwrap().strike, 95.0);
        assert_eq!(atm_contract(&chain, 108.0).unwrap().strike, 110.0);
        assert!(atm_contract(std::iter::empty(), 100.0).is_none());
        assert!(atm_contract(&chain, f64::NAN).is_none());
    }

    struct FixedChain {
        name: &'static str,
        rows: Vec<RawContract>,
    }

    impl DataSource for FixedChain {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl ChainSource for FixedChain {
        async fn fetch_chain(
            &self,
            _ticker: &str,
            expiry: Option<NaiveDate>,
        ) -> anyhow::Result<Vec<RawContract>> {
            if self.rows.is_empty() {
                anyhow::bail!("down");
            }
            Ok(self
                .rows
                .iter()
                .filter(|r| expiry.is_none() || r.expiry == expiry)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn assembler_aligns_second_source_to_first_expiry() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 17);
        let feb = NaiveDate::from_ymd_opt(2025, 2, 21);
        let mut feb_row = raw(100.0, OptionType::Call, Some(0.9));
        feb_row.expiry = feb;

        let first = FixedChain {
            name: "yahoo",
            rows: vec![raw(100.0, OptionType::Call, Some(0.4))],
        };
        let mut jan_row = raw(100.0, OptionType::Call, None);
        jan_row.delta = Some(0.5);
        let second = FixedChain {
            name: "polygon",
            rows: vec![feb_row, jan_row],
        };

        let assembler = ChainAssembler::new(
            Some(Arc::new(first)),
            Some(Arc::new(second)),
            Duration::from_millis(200),
        );
        assert_eq!(assembler.identity(), "yahoo+polygon");

        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let chain = assembler.nearest_expiry_chain("SPY", today).await;
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].expiry, jan);
        assert_eq!(chain[0].implied_volatility, Some(40.0));
        assert_eq!(chain[0].delta, Some(0.5));

        let all = assembler.all_expiries_chain("SPY").await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn assembler_survives_both_sources_down() {
        let down = || -> Option<Arc<dyn ChainSource>> {
            Some(Arc::new(FixedChain {
                name: "down",
                rows: vec![],
            }))
        };
        let assembler = ChainAssembler::new(down(), down(), Duration::from_millis(200));
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert!(assembler.nearest_expiry_chain("SPY", today).await.is_empty());
        assert!(assembler.all_expiries_chain("SPY").await.is_empty());
    }
}
