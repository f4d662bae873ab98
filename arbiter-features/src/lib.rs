//! Feature extraction, market regime classification, and risk targets.
//!
//! Everything in this crate is pure and synchronous: the same inputs always
//! produce the same outputs, which is what makes dry-run/live parity and the
//! offline relabeling path possible.

pub mod builder;
pub mod indicators;
pub mod regime;
pub mod risk;
pub mod window;

pub use builder::{ExecutionSummary, FeatureBuilder};
pub use regime::RegimeFilter;
pub use risk::RiskCalculator;
pub use window::CandleWindow;

use arbiter_core::Symbol;
use thiserror::Error;

/// Result alias for feature pipeline operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Feature pipeline error type.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Not enough candles to fill the indicator windows yet.
    #[error("insufficient history for {symbol}: have {have}, need {need}")]
    InsufficientHistory {
        symbol: Symbol,
        have: usize,
        need: usize,
    },
    /// A candle arrived with a timestamp at or before the latest one.
    #[error("out-of-order candle for {symbol} at {timestamp}")]
    OutOfOrderCandle {
        symbol: Symbol,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// An indicator was asked to run with a zero-length window.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
