// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

/// Trailing mean of the last `period` closes.
///
/// Returns `None` when:
/// - `period == 0`
/// - Fewer than `period` data points.
/// - The mean is non-finite.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_trailing_window() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&closes, 2), Some(4.5));
        assert_eq!(sma(&closes, 5), Some(3.0));
    }

    #[test]
    fn sma_insufficient_data() {
        let closes: Vec<f64> = (0..199).map(|x| x as f64).collect();
        assert!(sma(&closes, 200).is_none());
        assert!(sma(&closes, 0).is_none());
    }
}
