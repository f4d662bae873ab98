//! Conflict resolution between strategy variants.

use std::collections::HashMap;

use arbiter_config::{ConflictResolution, StrategyConfig};
use arbiter_core::{FeatureVector, Position, ProposedAction, Regime};
use tracing::debug;

use crate::{StrategyError, StrategyResult, StrategyVariant};

/// Stateless arbiter over a set of variants.
///
/// While a position is open only the owning variant is consulted, and its
/// exit/stop proposals bypass the regime gate: a regime change must never
/// trap an open position. Entries are gated by `allowed_regimes` first and
/// only then run through conflict resolution.
pub struct StrategySelector {
    variants: Vec<Box<dyn StrategyVariant>>,
    allowed_regimes: HashMap<String, Vec<Regime>>,
    priority: Vec<String>,
    conflict_resolution: ConflictResolution,
}

impl StrategySelector {
    pub fn new(variants: Vec<Box<dyn StrategyVariant>>, config: &StrategyConfig) -> Self {
        Self {
            variants,
            allowed_regimes: config.allowed_regimes.clone(),
            priority: config.priority.clone(),
            conflict_resolution: config.conflict_resolution,
        }
    }

    /// Built-in variant set under the given configuration.
    pub fn with_defaults(config: &StrategyConfig) -> Self {
        Self::new(
            vec![
                Box::new(crate::TrendFollow::default()),
                Box::new(crate::Breakout::default()),
                Box::new(crate::Reversal::default()),
            ],
            config,
        )
    }

    fn regime_allowed(&self, variant: &str, regime: Regime) -> bool {
        self.allowed_regimes
            .get(variant)
            .is_some_and(|list| list.contains(&regime))
    }

    /// Rank of a variant in the configured priority list; unlisted
    /// variants sort last.
    fn priority_rank(&self, variant: &str) -> usize {
        self.priority
            .iter()
            .position(|name| name == variant)
            .unwrap_or(self.priority.len())
    }

    /// Produce at most one proposal for this cycle.
    pub fn select(
        &self,
        features: &FeatureVector,
        regime: Regime,
        position: Option<&Position>,
    ) -> StrategyResult<Option<ProposedAction>> {
        if let Some(pos) = position {
            let owner = self
                .variants
                .iter()
                .find(|v| v.name() == pos.strategy)
                .ok_or_else(|| StrategyError::UnknownVariant(pos.strategy.clone()))?;
            return Ok(owner.propose(features, regime, Some(pos)));
        }

        let mut proposals: Vec<ProposedAction> = Vec::new();
        for variant in &self.variants {
            if !self.regime_allowed(variant.name(), regime) {
                debug!(
                    target: "arbiter.strategy",
                    variant = variant.name(),
                    regime = %regime,
                    "entry gated by regime"
                );
                continue;
            }
            if let Some(proposal) = variant.propose(features, regime, None) {
                proposals.push(proposal);
            }
        }
        if proposals.is_empty() {
            return Ok(None);
        }

        let winner = match self.conflict_resolution {
            ConflictResolution::Priority => proposals
                .into_iter()
                .min_by_key(|p| self.priority_rank(&p.strategy)),
            ConflictResolution::Confidence => proposals.into_iter().min_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        self.priority_rank(&a.strategy)
                            .cmp(&self.priority_rank(&b.strategy))
                    })
            }),
        };
        Ok(winner)
    }
}
