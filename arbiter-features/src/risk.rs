//! Risk target derivation and fee-aware P&L evaluation.
//!
//! Every profit or breakeven decision in the engine must run through
//! [`RiskCalculator::net_pnl`]: a gross move that does not clear the
//! round-trip fee is a loss, and treating it as profit churns positions at
//! negative expectancy.

use arbiter_config::RiskConfig;
use arbiter_core::{Price, Quantity, RiskTargets, Side};

/// Derives exit levels from ATR multiples and evaluates realized P&L net
/// of fees. Pure functions of their inputs.
pub struct RiskCalculator {
    tp_multiplier: f64,
    sl_multiplier: f64,
    fee_rate: f64,
}

impl RiskCalculator {
    #[must_use]
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            tp_multiplier: config.tp_multiplier,
            sl_multiplier: config.sl_multiplier,
            fee_rate: config.fee_rate,
        }
    }

    #[must_use]
    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// Take-profit and stop-loss around an entry, scaled by ATR, plus the
    /// per-unit round-trip fee floor at that entry price.
    #[must_use]
    pub fn targets(&self, entry: Price, side: Side, atr: Price) -> RiskTargets {
        let sign = f64::from(side.as_i8());
        RiskTargets {
            take_profit: entry + sign * atr * self.tp_multiplier,
            stop_loss: entry - sign * atr * self.sl_multiplier,
            net_profit_threshold: self.round_trip_fee(entry),
        }
    }

    /// Fee cost per unit for entering and exiting at roughly this price.
    #[must_use]
    pub fn round_trip_fee(&self, entry: Price) -> Price {
        entry * self.fee_rate * 2.0
    }

    /// Gross P&L reduced by the round-trip fee on the traded notional.
    /// Used live for breakeven gating and by the offline relabeling path.
    #[must_use]
    pub fn net_pnl(&self, gross: f64, entry: Price, size: Quantity) -> f64 {
        gross - self.round_trip_fee(entry) * size
    }

    /// True when a gross move is profitable after fees.
    #[must_use]
    pub fn clears_fees(&self, gross: f64, entry: Price, size: Quantity) -> bool {
        self.net_pnl(gross, entry, size) > 0.0
    }
}
