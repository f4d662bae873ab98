//! Indicator math over ordered candle series.

use arbiter_config::AtrSmoothing;
use arbiter_core::{Candle, Price};

use crate::{FeatureError, FeatureResult};

/// Simple moving average of the trailing `period` values.
pub fn sma(values: &[f64], period: usize) -> FeatureResult<f64> {
    if period == 0 {
        return Err(FeatureError::InvalidParameter("sma period is zero".into()));
    }
    if values.len() < period {
        return Err(FeatureError::InvalidParameter(format!(
            "sma needs {period} values, got {}",
            values.len()
        )));
    }
    let tail = &values[values.len() - period..];
    Ok(tail.iter().sum::<f64>() / period as f64)
}

/// Average true range over the trailing `window` ranges.
///
/// `Sma` averages the raw true ranges; `Ema` applies Wilder smoothing
/// (alpha = 1/window) seeded with the first range of the tail.
pub fn atr(candles: &[&Candle], window: usize, smoothing: AtrSmoothing) -> FeatureResult<Price> {
    if window == 0 {
        return Err(FeatureError::InvalidParameter("atr window is zero".into()));
    }
    if candles.len() < window + 1 {
        return Err(FeatureError::InvalidParameter(format!(
            "atr needs {} candles, got {}",
            window + 1,
            candles.len()
        )));
    }
    let start = candles.len() - window;
    let ranges: Vec<Price> = (start..candles.len())
        .map(|i| candles[i].true_range(candles[i - 1].close))
        .collect();
    let value = match smoothing {
        AtrSmoothing::Sma => ranges.iter().sum::<Price>() / window as f64,
        AtrSmoothing::Ema => {
            let alpha = 1.0 / window as f64;
            let mut acc = ranges[0];
            for r in &ranges[1..] {
                acc += alpha * (*r - acc);
            }
            acc
        }
    };
    Ok(value)
}

/// Wilder RSI over the trailing `period` close-to-close moves, in [0, 100].
pub fn rsi(closes: &[f64], period: usize) -> FeatureResult<f64> {
    if period == 0 {
        return Err(FeatureError::InvalidParameter("rsi period is zero".into()));
    }
    if closes.len() < period + 1 {
        return Err(FeatureError::InvalidParameter(format!(
            "rsi needs {} closes, got {}",
            period + 1,
            closes.len()
        )));
    }
    let start = closes.len() - period;
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in start..closes.len() {
        let delta = closes[i] - closes[i - 1];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    if losses == 0.0 {
        return Ok(100.0);
    }
    let rs = gains / losses;
    Ok(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger bands: (lower, middle, upper) at `sigma` standard deviations.
pub fn bollinger(closes: &[f64], period: usize, sigma: f64) -> FeatureResult<(f64, f64, f64)> {
    let mid = sma(closes, period)?;
    let tail = &closes[closes.len() - period..];
    let variance = tail.iter().map(|c| (c - mid).powi(2)).sum::<f64>() / period as f64;
    let dev = variance.sqrt();
    Ok((mid - sigma * dev, mid, mid + sigma * dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".into(),
            open,
            high,
            low,
            close,
            volume: 1.0,
            timestamp: Utc::now() + Duration::minutes(i),
        }
    }

    #[test]
    fn sma_uses_the_trailing_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 2).unwrap(), 4.5);
        assert!(sma(&values, 6).is_err());
    }

    #[test]
    fn atr_sma_matches_hand_computation() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(1, 100.0, 103.0, 100.0, 102.0), // TR = 3
            candle(2, 102.0, 102.0, 100.0, 101.0), // TR = 2
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let value = atr(&refs, 2, AtrSmoothing::Sma).unwrap();
        assert!((value - 2.5).abs() < 1e-12);
    }

    #[test]
    fn rsi_is_pinned_for_monotonic_series() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14).unwrap(), 100.0);
        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&falling, 14).unwrap() < 1e-9);
    }

    #[test]
    fn bollinger_is_symmetric_around_the_mean() {
        let closes = [99.0, 101.0, 99.0, 101.0, 100.0];
        let (lower, mid, upper) = bollinger(&closes, 5, 2.0).unwrap();
        assert!((mid - 100.0).abs() < 1e-12);
        assert!((upper - mid - (mid - lower)).abs() < 1e-12);
        assert!(upper > mid && lower < mid);
    }
}
