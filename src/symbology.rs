// =============================================================================
// Contract symbology
// =============================================================================
//
// Exchange-style option identifier:  O:{ROOT}{YYMMDD}{C|P}{strike×1000, 8 digits}
//   e.g. NVDA call, 17 Jan 2025, strike 150  ->  O:NVDA250117C00150000
//
// Stream channels prefix a trade feed with `T.`.
// =============================================================================

use chrono::NaiveDate;

use crate::types::OptionType;

pub fn option_contract_id(root: &str, expiry: NaiveDate, option_type: OptionType, strike: f64) -> String {
    let strike_thousandths = (strike * 1000.0).round() as i64;
    format!(
        "O:{}{}{}{:08}",
        root.trim().to_uppercase(),
        expiry.format("%y%m%d"),
        option_type.marker(),
        strike_thousandths
    )
}

/// Trade channel of one option contract.
pub fn stream_option_symbol(
    root: &str,
    expiry: NaiveDate,
    option_type: OptionType,
    strike: f64,
) -> String {
    format!("T.{}", option_contract_id(root, expiry, option_type, strike))
}

/// Trade channel of the underlying.
pub fn stream_trade_symbol(ticker: &str) -> String {
    format!("T.{}", ticker.trim().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan17() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
    }

    #[test]
    fn contract_id_pads_strike() {
        assert_eq!(
            option_contract_id("nvda", jan17(), OptionType::Call, 150.0),
            "O:NVDA250117C00150000"
        );
        assert_eq!(
            option_contract_id("SPY", jan17(), OptionType::Put, 502.5),
            "O:SPY250117P00502500"
        );
    }

    #[test]
    fn fractional_strike_rounds_to_thousandths() {
        assert_eq!(
            option_contract_id("F", jan17(), OptionType::Call, 12.345_4),
            "O:F250117C00012345"
        );
    }

    #[test]
    fn stream_symbols() {
        assert_eq!(
            stream_option_symbol("AMD", jan17(), OptionType::Call, 150.0),
            "T.O:AMD250117C00150000"
        );
        assert_eq!(stream_trade_symbol("amd"), "T.AMD");
    }
}
