// =============================================================================
// Signal classification
// =============================================================================
//
//   composite >= buy   -> BUY
//   composite >= hold  -> HOLD
//   composite >= watch -> WATCH
//   otherwise          -> SELL
//
// ROLL is appended to BUY or HOLD when theta is below the roll threshold or
// DTE is below the roll DTE. A pure function of (composite, theta, DTE).
// =============================================================================

use serde::{Serialize, Serializer};

use crate::runtime_config::ScoringParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Hold,
    Watch,
    Sell,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Watch => write!(f, "WATCH"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub roll: bool,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.roll {
            write!(f, "{} + ROLL", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Serialized as its display label, e.g. `"BUY + ROLL"`.
impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn classify_signal(
    composite: i64,
    theta: Option<f64>,
    dte: Option<i64>,
    params: &ScoringParams,
) -> Signal {
    let kind = if composite >= params.buy_threshold {
        SignalKind::Buy
    } else if composite >= params.hold_threshold {
        SignalKind::Hold
    } else if composite >= params.watch_threshold {
        SignalKind::Watch
    } else {
        SignalKind::Sell
    };

    let decaying = theta.is_some_and(|t| t < params.roll_theta)
        || dte.is_some_and(|d| d < params.roll_dte);
    let roll = matches!(kind, SignalKind::Buy | SignalKind::Hold) && decaying;

    Signal { kind, roll }
}
