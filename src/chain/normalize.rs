// =============================================================================
// Chain normalization helpers
// =============================================================================
//
// Two conventions differ between sources and are reconciled here, once:
//   - implied volatility as a 0–1 fraction vs. a 0–100 percentage
//   - option type as an explicit label vs. only the contract symbol
// =============================================================================

use crate::types::{OptionContract, OptionType, RawContract};

/// Raw IVs below this are fractions and get rescaled to percent.
const FRACTION_CEILING: f64 = 2.0;

/// Width of the zero-padded strike field at the end of a contract symbol.
const STRIKE_FIELD_LEN: usize = 8;

/// Rescale an IV to the 0–100 percentage convention.
///
/// A raw value below 2 is taken as a fraction (`0.48` -> `48`); anything
/// else is already a percentage. Negative or non-finite input is absent.
pub fn normalize_iv(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    Some(if raw < FRACTION_CEILING { raw * 100.0 } else { raw })
}

/// Derive the option type from an OCC-style symbol such as
/// `AAPL250117C00150000` or `O:AAPL250117C00150000`: the character right
/// before the 8-digit strike field is the `C`/`P` marker.
pub fn option_type_from_symbol(symbol: &str) -> Option<OptionType> {
    let bytes = symbol.trim().as_bytes();
    if bytes.len() <= STRIKE_FIELD_LEN {
        return None;
    }
    let marker_at = bytes.len() - STRIKE_FIELD_LEN - 1;
    if !bytes[marker_at + 1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    match bytes[marker_at] {
        b'C' | b'c' => Some(OptionType::Call),
        b'P' | b'p' => Some(OptionType::Put),
        _ => None,
    }
}

/// Turn a raw row into a normalized contract. Rows without a strike, or
/// whose type can be neither read nor derived, are dropped.
pub fn normalize_contract(raw: &RawContract) -> Option<OptionContract> {
    let strike = raw.strike.filter(|s| s.is_finite() && *s > 0.0)?;
    let option_type = raw
        .option_type
        .or_else(|| raw.symbol.as_deref().and_then(option_type_from_symbol))?;

    Some(OptionContract {
        strike,
        option_type,
        implied_volatility: raw.implied_volatility.and_then(normalize_iv),
        expiry: raw.expiry,
        bid: raw.bid,
        ask: raw.ask,
        open_interest: raw.open_interest,
        delta: raw.delta,
        theta: raw.theta,
        gamma: raw.gamma,
        vega: raw.vega,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iv_fraction_is_rescaled() {
        assert_eq!(normalize_iv(0.48), Some(48.0));
        assert_eq!(normalize_iv(1.5), Some(150.0));
    }

    #[test]
    fn iv_percentage_is_unchanged() {
        assert_eq!(normalize_iv(48.0), Some(48.0));
        assert_eq!(normalize_iv(2.0), Some(2.0));
    }

    #[test]
    fn iv_invalid_is_absent() {
        assert_eq!(normalize_iv(-0.1), None);
        assert_eq!(normalize_iv(f64::NAN), None);
    }

    #[test]
    fn type_from_plain_and_prefixed_symbols() {
        assert_eq!(option_type_from_symbol("AAPL250117C00150000"), Some(OptionType::Call));
        assert_eq!(option_type_from_symbol("O:SPY250117P00500000"), Some(OptionType::Put));
        assert_eq!(option_type_from_symbol("AAPL"), None);
        assert_eq!(option_type_from_symbol("AAPL250117X00150000"), None);
        assert_eq!(option_type_from_symbol("AAPL250117C0015000A"), None);
    }

    #[test]
    fn contract_without_strike_or_type_is_dropped() {
        let no_strike = RawContract {
            option_type: Some(OptionType::Call),
            ..RawContract::default()
        };
        assert!(normalize_contract(&no_strike).is_none());

        let no_type = RawContract {
            strike: Some(100.0),
            symbol: Some("garbage".into()),
            ..RawContract::default()
        };
        assert!(normalize_contract(&no_type).is_none());

        let derived = RawContract {
            strike: Some(100.0),
            symbol: Some("NVDA250117P00100000".into()),
            implied_volatility: Some(0.3),
            ..RawContract::default()
        };
        let c = normalize_contract(&derived).unwrap();
        assert_eq!(c.option_type, OptionType::Put);
        assert_eq!(c.implied_volatility, Some(30.0));
    }
}
