//! Market regime classification.

use arbiter_config::FeatureConfig;
use arbiter_core::{FeatureVector, Regime};

/// Classifies the prevailing regime from an already-built feature vector.
///
/// Volatility is checked first: a market moving more than the configured
/// share of its price per bar is hostile to every entry style, whatever the
/// moving averages say. Otherwise the fast/slow MA ratio decides trend
/// direction, with a neutral band mapping to `Range`.
pub struct RegimeFilter {
    high_volatility_ratio: f64,
    trend_band: f64,
}

impl RegimeFilter {
    #[must_use]
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            high_volatility_ratio: config.high_volatility_ratio,
            trend_band: config.trend_band,
        }
    }

    #[must_use]
    pub fn classify(&self, features: &FeatureVector) -> Regime {
        if features.volatility > self.high_volatility_ratio {
            return Regime::HighVolatility;
        }
        if features.ma_ratio > 1.0 + self.trend_band {
            Regime::TrendUp
        } else if features.ma_ratio < 1.0 - self.trend_band {
            Regime::TrendDown
        } else {
            Regime::Range
        }
    }
}
