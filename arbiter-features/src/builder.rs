//! Feature vector construction.

use arbiter_config::FeatureConfig;
use arbiter_core::FeatureVector;

use crate::indicators::{atr, bollinger, rsi, sma};
use crate::window::CandleWindow;
use crate::{FeatureError, FeatureResult};

/// Recent execution quality folded into the feature vector. Neutral by
/// default so symbols with no trading history score unbiased.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionSummary {
    /// Share of recent closed trades with positive net P&L.
    pub win_rate: f64,
    /// Fees paid over gross traded notional.
    pub fee_drag: f64,
}

impl Default for ExecutionSummary {
    fn default() -> Self {
        Self {
            win_rate: 0.5,
            fee_drag: 0.0,
        }
    }
}

/// Deterministic feature extraction over a candle window.
///
/// Stateless: all history lives in the [`CandleWindow`] and the execution
/// summary, so replaying the same inputs reproduces the same vector.
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    #[must_use]
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Builds the full feature vector for the window's latest candle.
    ///
    /// Returns [`FeatureError::InsufficientHistory`] until every indicator
    /// window is filled; callers treat that as an explicit hold.
    pub fn build(
        &self,
        window: &CandleWindow,
        exec: &ExecutionSummary,
    ) -> FeatureResult<FeatureVector> {
        let need = self.config.min_history();
        if window.len() < need {
            return Err(FeatureError::InsufficientHistory {
                symbol: window.symbol().to_string(),
                have: window.len(),
                need,
            });
        }

        let candles = window.as_vec();
        let closes = window.closes();
        let latest = candles[candles.len() - 1];
        let prev = candles[candles.len() - 2];

        let ma_fast = sma(&closes, self.config.ma_fast)?;
        let ma_slow = sma(&closes, self.config.ma_slow)?;
        let atr_value = atr(&candles, self.config.atr_window, self.config.atr_smoothing)?;
        let rsi_value = rsi(&closes, self.config.rsi_period)?;
        let (band_lower, _, band_upper) =
            bollinger(&closes, self.config.band_period, self.config.band_sigma)?;

        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let avg_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;

        let band_width = band_upper - band_lower;
        let band_position = if band_width > f64::EPSILON {
            (latest.close - band_lower) / band_width
        } else {
            0.5
        };

        Ok(FeatureVector {
            symbol: window.symbol().to_string(),
            timestamp: latest.timestamp,
            ret_1: latest.close / prev.close - 1.0,
            momentum: latest.close / ma_fast - 1.0,
            ma_ratio: ma_fast / ma_slow,
            volatility: atr_value / latest.close,
            volume_ratio: if avg_volume > f64::EPSILON {
                latest.volume / avg_volume
            } else {
                1.0
            },
            rsi: rsi_value,
            band_position,
            win_rate: exec.win_rate,
            fee_drag: exec.fee_drag,
            atr: atr_value,
            close: latest.close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Candle;
    use chrono::{Duration, Utc};

    fn filled_window(len: usize) -> CandleWindow {
        let mut window = CandleWindow::new("BTCUSDT", len + 8);
        let base = Utc::now();
        for i in 0..len {
            let close = 100.0 + (i as f64 * 0.3).sin();
            window
                .push(Candle {
                    symbol: "BTCUSDT".into(),
                    open: close - 0.1,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 10.0 + i as f64,
                    timestamp: base + Duration::minutes(i as i64),
                })
                .unwrap();
        }
        window
    }

    #[test]
    fn short_history_is_an_explicit_hold_signal() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let window = filled_window(5);
        match builder.build(&window, &ExecutionSummary::default()) {
            Err(FeatureError::InsufficientHistory { have, need, .. }) => {
                assert_eq!(have, 5);
                assert!(need > 5);
            }
            other => panic!("expected InsufficientHistory, got {other:?}"),
        }
    }

    #[test]
    fn full_window_yields_bounded_features() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let window = filled_window(builder.config().min_history());
        let fv = builder
            .build(&window, &ExecutionSummary::default())
            .unwrap();
        assert_eq!(fv.symbol, "BTCUSDT");
        assert!(fv.atr > 0.0);
        assert!((0.0..=100.0).contains(&fv.rsi));
        assert!(fv.volume_ratio > 0.0);
        assert_eq!(fv.win_rate, 0.5);
    }

    #[test]
    fn identical_inputs_reproduce_identical_vectors() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let window = filled_window(builder.config().min_history() + 4);
        let exec = ExecutionSummary {
            win_rate: 0.6,
            fee_drag: 0.002,
        };
        let a = builder.build(&window, &exec).unwrap();
        let b = builder.build(&window, &exec).unwrap();
        assert_eq!(a, b);
    }
}
