//! Strategy variants and the selector that arbitrates between them.
//!
//! A variant is a capability behind a trait, not a subclass: it looks at the
//! current feature vector (and its own open position, if any) and either
//! proposes an action or stays silent. Regime eligibility is configuration,
//! not code, so operators can retune which variants trade which markets
//! without a deploy.

pub mod selector;
pub mod variants;

pub use selector::StrategySelector;
pub use variants::{Breakout, Reversal, TrendFollow};

use arbiter_core::{FeatureVector, Position, ProposedAction, Regime};
use thiserror::Error;

/// Result alias for strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Strategy-specific error type.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// A position references a variant the selector does not know.
    #[error("unknown strategy variant: {0}")]
    UnknownVariant(String),
    /// Raised when a variant is constructed with unusable parameters.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A single trading style. Implementations must be pure: no I/O, no
/// interior mutability, same inputs produce the same proposal.
pub trait StrategyVariant: Send + Sync {
    /// Stable name used in configuration, persistence, and position
    /// ownership.
    fn name(&self) -> &'static str;

    /// Propose an action for this cycle, or `None` to stay flat/quiet.
    ///
    /// When `position` is `Some` the variant owns it and is being asked
    /// for exit or stop management; entry proposals are only consulted
    /// while flat.
    fn propose(
        &self,
        features: &FeatureVector,
        regime: Regime,
        position: Option<&Position>,
    ) -> Option<ProposedAction>;
}
