// =============================================================================
// Relative Strength Index (RSI) — simple rolling means
// =============================================================================
//
// Step 1 — Price changes from consecutive closes. The first close has no
//          predecessor and counts as a zero change.
// Step 2 — Average gain / average loss = plain mean over the last `period`
//          changes (no Wilder smoothing).
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Because the leading zero change fills the window, `period` closes are
// enough for a value.
// =============================================================================

/// Most recent RSI over `period`, or `None` with fewer than `period` closes.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - No movement at all => 50.0
/// - Only gains => 100.0
/// - Non-finite result => `None`
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let start = closes.len() - period;
    let (sum_gain, sum_loss) = (start..closes.len()).fold((0.0_f64, 0.0_f64), |(g, l), i| {
        let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        if delta > 0.0 {
            (g + delta, l)
        } else {
            (g, l - delta)
        }
    });

    let period_f = period as f64;
    rsi_from_averages(sum_gain / period_f, sum_loss / period_f)
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// - If both averages are zero, RSI is 50.0 (no movement).
/// - If average loss is zero (only gains), RSI is 100.0.
/// - Returns `None` when the result is non-finite.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if rsi.is_finite() {
        Some(rsi)
    } else {
        None
    }
}
