// =============================================================================
// MACD (12, 26, 9)
// =============================================================================
//
//   line      = EMA_fast(close) - EMA_slow(close)
//   signal    = EMA_signal(line)
//   histogram = line - signal
//
// Momentum is "rising" when the latest line value sits above the signal.
// =============================================================================

use serde::Serialize;

use super::ema::ema_series;

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdReading {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdReading {
    pub fn is_rising(&self) -> bool {
        self.line > self.signal
    }
}

/// Latest MACD reading, or `None` with fewer than `slow` closes.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdReading> {
    if fast == 0 || slow == 0 || signal == 0 || closes.len() < slow {
        return None;
    }

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    if fast_ema.len() != closes.len() || slow_ema.len() != closes.len() {
        return None;
    }

    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_series = ema_series(&line, signal);

    let line_last = *line.last()?;
    let signal_last = *signal_series.last()?;
    Some(MacdReading {
        line: line_last,
        signal: signal_last,
        histogram: line_last - signal_last,
    })
}

/// MACD with the standard 12/26/9 windows.
pub fn standard_macd(closes: &[f64]) -> Option<MacdReading> {
    macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL)
}
