//! Online learning loop and the offline training contract.
//!
//! The online side adjusts a small linear model from realized trade
//! outcomes as they stream in; the offline side fits candidate artifacts
//! from a labeled corpus without ever touching what is live. Both speak the
//! same weight layout defined by `arbiter_core::FEATURE_NAMES`.

pub mod learner;
pub mod model;
pub mod trainer;

pub use learner::{LearnerStats, OnlineLearner};
pub use model::{ModelParams, OnlineModel};
pub use trainer::{GradientTrainer, LabeledSample, OfflineTrainer};

use arbiter_core::TraceId;
use thiserror::Error;

/// Fee-normalized outcome label in [-1, 1]: net P&L measured against a
/// 0.2% slice of the traded notional (one fee round trip at typical taker
/// rates). Shared by the online update path and offline relabeling so
/// both sides learn from identical targets.
#[must_use]
pub fn outcome_label(net_pnl: f64, notional: f64) -> f64 {
    let scale = (notional * 0.002).max(f64::EPSILON);
    (net_pnl / scale).tanh()
}

/// Result alias for learner operations.
pub type LearnerResult<T> = Result<T, LearnerError>;

/// Learner-specific error type.
#[derive(Debug, Error)]
pub enum LearnerError {
    /// Feedback arrived for a trace id no emitted decision claims.
    /// Non-fatal: the feedback is dropped and counted.
    #[error("orphan feedback for trace {0}")]
    OrphanFeedback(TraceId),
    /// A model artifact's weight vector does not match the feature schema.
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The offline trainer was handed nothing to fit.
    #[error("empty training corpus")]
    EmptyCorpus,
}
