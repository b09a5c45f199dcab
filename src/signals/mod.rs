// =============================================================================
// Signals Module
// =============================================================================
//
// Scoring pipeline for one instrument:
// - Four independent sub-scores (technical, Greeks, sentiment, DTE)
// - Weighted composite of the sub-scores
// - BUY / HOLD / WATCH / SELL classification with the ROLL override

pub mod classify;
pub mod sub_scores;
pub mod weighted_score;

pub use classify::{classify_signal, Signal, SignalKind};
pub use sub_scores::{
    dte_score, greeks_score, sentiment_score, technical_score, GreeksInputs, TechnicalInputs,
};
pub use weighted_score::{composite_score, CompositeWeights, ScoreBreakdown};
