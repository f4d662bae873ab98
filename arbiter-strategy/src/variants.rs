//! Built-in strategy variants.

use arbiter_core::{DecisionAction, FeatureVector, Position, ProposedAction, Regime, Side};

use crate::StrategyVariant;

/// Mechanical protective exits shared by every variant: stop-loss and
/// take-profit levels are honored before any technical signal is read.
fn protective_exit(position: &Position, close: f64) -> Option<ProposedAction> {
    let (stopped, target_hit) = match position.side {
        Side::Buy => (close <= position.stop_loss, close >= position.take_profit),
        Side::Sell => (close >= position.stop_loss, close <= position.take_profit),
    };
    if stopped {
        return Some(exit(&position.strategy, "stop_loss", 1.0));
    }
    if target_hit {
        return Some(exit(&position.strategy, "take_profit", 1.0));
    }
    None
}

/// Breakeven protection: once the open gross P&L clears the round-trip fee
/// floor, ratchet the stop to the entry price. Gross gains below the floor
/// are net losses and never arm the ratchet.
fn breakeven_adjust(position: &Position, close: f64) -> Option<ProposedAction> {
    let gross = position.gross_pnl(close);
    let fee_floor = position.net_profit_threshold * position.size;
    if gross <= fee_floor {
        return None;
    }
    let already_armed = match position.side {
        Side::Buy => position.stop_loss >= position.entry_price,
        Side::Sell => position.stop_loss <= position.entry_price,
    };
    if already_armed {
        return None;
    }
    Some(ProposedAction {
        strategy: position.strategy.clone(),
        action: DecisionAction::Adjust {
            stop_loss: position.entry_price,
        },
        confidence: 1.0,
        reason: "breakeven_protect".into(),
    })
}

fn exit(strategy: &str, reason: &str, confidence: f64) -> ProposedAction {
    ProposedAction {
        strategy: strategy.to_string(),
        action: DecisionAction::Exit {
            reason: reason.to_string(),
        },
        confidence,
        reason: reason.to_string(),
    }
}

fn entry(strategy: &str, side: Side, confidence: f64, reason: &str) -> ProposedAction {
    ProposedAction {
        strategy: strategy.to_string(),
        action: DecisionAction::Enter { side, size: 1.0 },
        confidence: confidence.clamp(0.0, 1.0),
        reason: reason.to_string(),
    }
}

/// Rides established trends: enters with the moving-average direction when
/// momentum and volume confirm, leaves when the averages cross back.
#[derive(Debug, Clone)]
pub struct TrendFollow {
    /// Volume expansion required to confirm an entry.
    pub volume_spike: f64,
    /// RSI ceiling for longs (mirrored as floor for shorts); avoids buying
    /// into an already exhausted move.
    pub rsi_ceiling: f64,
}

impl Default for TrendFollow {
    fn default() -> Self {
        Self {
            volume_spike: 1.5,
            rsi_ceiling: 65.0,
        }
    }
}

impl StrategyVariant for TrendFollow {
    fn name(&self) -> &'static str {
        "trend_follow"
    }

    fn propose(
        &self,
        features: &FeatureVector,
        _regime: Regime,
        position: Option<&Position>,
    ) -> Option<ProposedAction> {
        if let Some(pos) = position {
            if let Some(action) = protective_exit(pos, features.close) {
                return Some(action);
            }
            // Trend gone: averages crossed back against the position.
            let trend_dead = match pos.side {
                Side::Buy => features.ma_ratio < 1.0,
                Side::Sell => features.ma_ratio > 1.0,
            };
            if trend_dead {
                return Some(exit(self.name(), "trend_reversed", 0.8));
            }
            return breakeven_adjust(pos, features.close);
        }

        if features.volume_ratio < self.volume_spike {
            return None;
        }
        let confidence = 0.5
            + (features.volume_ratio - self.volume_spike).min(1.0) * 0.2
            + features.momentum.abs().min(0.05) * 4.0;
        if features.ma_ratio > 1.0 && features.momentum > 0.0 && features.rsi < self.rsi_ceiling {
            return Some(entry(self.name(), Side::Buy, confidence, "uptrend_confirmed"));
        }
        if features.ma_ratio < 1.0
            && features.momentum < 0.0
            && features.rsi > 100.0 - self.rsi_ceiling
        {
            return Some(entry(
                self.name(),
                Side::Sell,
                confidence,
                "downtrend_confirmed",
            ));
        }
        None
    }
}

/// Mean reversion: buys oversold touches of the lower Bollinger band,
/// exits at the band midline, protects breakeven once fees are covered.
#[derive(Debug, Clone)]
pub struct Reversal {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Band position at or below which a touch counts.
    pub touch_band: f64,
    /// Band position at which the reversion is considered played out.
    pub midline: f64,
}

impl Default for Reversal {
    fn default() -> Self {
        Self {
            rsi_oversold: 25.0,
            rsi_overbought: 75.0,
            touch_band: 0.02,
            midline: 0.5,
        }
    }
}

impl StrategyVariant for Reversal {
    fn name(&self) -> &'static str {
        "reversal"
    }

    fn propose(
        &self,
        features: &FeatureVector,
        _regime: Regime,
        position: Option<&Position>,
    ) -> Option<ProposedAction> {
        if let Some(pos) = position {
            if let Some(action) = protective_exit(pos, features.close) {
                return Some(action);
            }
            let reverted = match pos.side {
                Side::Buy => features.band_position >= self.midline,
                Side::Sell => features.band_position <= self.midline,
            };
            if reverted {
                return Some(exit(self.name(), "band_midline", 0.9));
            }
            return breakeven_adjust(pos, features.close);
        }

        if features.rsi <= self.rsi_oversold && features.band_position <= self.touch_band {
            let confidence = 0.55 + (self.rsi_oversold - features.rsi).min(15.0) / 100.0;
            return Some(entry(
                self.name(),
                Side::Buy,
                confidence,
                "rsi_oversold_band_touch",
            ));
        }
        if features.rsi >= self.rsi_overbought && features.band_position >= 1.0 - self.touch_band {
            let confidence = 0.55 + (features.rsi - self.rsi_overbought).min(15.0) / 100.0;
            return Some(entry(
                self.name(),
                Side::Sell,
                confidence,
                "rsi_overbought_band_touch",
            ));
        }
        None
    }
}

/// Band breakout: enters when price escapes the Bollinger envelope on
/// expanding volume, betting on continuation.
#[derive(Debug, Clone)]
pub struct Breakout {
    pub volume_confirm: f64,
}

impl Default for Breakout {
    fn default() -> Self {
        Self {
            volume_confirm: 1.2,
        }
    }
}

impl StrategyVariant for Breakout {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn propose(
        &self,
        features: &FeatureVector,
        _regime: Regime,
        position: Option<&Position>,
    ) -> Option<ProposedAction> {
        if let Some(pos) = position {
            if let Some(action) = protective_exit(pos, features.close) {
                return Some(action);
            }
            // Failed breakout: price slipped back inside the envelope.
            let faded = match pos.side {
                Side::Buy => features.band_position < 0.8,
                Side::Sell => features.band_position > 0.2,
            };
            if faded {
                return Some(exit(self.name(), "breakout_faded", 0.7));
            }
            return breakeven_adjust(pos, features.close);
        }

        if features.volume_ratio < self.volume_confirm {
            return None;
        }
        if features.band_position > 1.0 {
            let confidence = 0.5 + (features.band_position - 1.0).min(0.5) * 0.4;
            return Some(entry(self.name(), Side::Buy, confidence, "upper_band_break"));
        }
        if features.band_position < 0.0 {
            let confidence = 0.5 + (-features.band_position).min(0.5) * 0.4;
            return Some(entry(
                self.name(),
                Side::Sell,
                confidence,
                "lower_band_break",
            ));
        }
        None
    }
}
