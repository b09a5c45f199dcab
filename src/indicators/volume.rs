// =============================================================================
// Volume statistics
// =============================================================================
//
// Trailing average = mean of the last `window` non-zero, finite daily
// volumes (zero-volume days are data gaps, not quiet days).
// Ratio          = today / trailing average, 0 when the average is zero or
//                  absent.
// =============================================================================

pub const AVERAGE_VOLUME_WINDOW: usize = 30;

/// Threshold above which volume counts as a surge for scoring.
pub const VOLUME_SURGE_RATIO: f64 = 1.5;

pub fn trailing_average_volume(volumes: &[f64], window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    let recent: Vec<f64> = volumes
        .iter()
        .rev()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .take(window)
        .collect();
    if recent.is_empty() {
        return None;
    }
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

/// Last day's volume, when reported.
pub fn latest_volume(volumes: &[f64]) -> Option<f64> {
    volumes.last().copied().filter(|v| v.is_finite())
}

pub fn volume_ratio(today: f64, average: Option<f64>) -> f64 {
    match average {
        Some(avg) if avg != 0.0 && avg.is_finite() && today.is_finite() => today / avg,
        _ => 0.0,
    }
}
