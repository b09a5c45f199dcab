// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Drives the 20/50-day trend reading and both MACD legs.
//
//   multiplier = 2 / (period + 1)
//   EMA_0      = close_0
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The recursion is seeded with the first close and carries no bias
// correction, so the series has one value per input close.
// =============================================================================

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// The output has the same length as the input.
///
/// # Edge cases
/// - `period == 0` or empty input => empty vec
/// - A non-finite intermediate value truncates the series.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut result = Vec::with_capacity(closes.len());
    let mut prev = closes[0];
    if !prev.is_finite() {
        return result;
    }
    result.push(prev);

    for &close in &closes[1..] {
        let ema = close * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev = ema;
    }

    result
}

/// Latest EMA value, or `None` when fewer than `period` closes exist.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let series = ema_series(closes, period);
    if series.len() != closes.len() {
        return None;
    }
    series.last().copied()
}
