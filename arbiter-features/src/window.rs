//! Bounded per-symbol candle history with a monotonic-timestamp guard.

use std::collections::VecDeque;

use arbiter_core::{Candle, Symbol};

use crate::{FeatureError, FeatureResult};

/// Rolling candle window. Never reallocates past its capacity and rejects
/// candles that would break timestamp monotonicity, so downstream indicator
/// math can assume a clean, ordered series.
#[derive(Debug)]
pub struct CandleWindow {
    symbol: Symbol,
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    pub fn new(symbol: impl Into<Symbol>, capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            symbol: symbol.into(),
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a candle, evicting the oldest when full. Duplicate or
    /// backwards timestamps are rejected.
    pub fn push(&mut self, candle: Candle) -> FeatureResult<()> {
        if let Some(last) = self.candles.back() {
            if candle.timestamp <= last.timestamp {
                return Err(FeatureError::OutOfOrderCandle {
                    symbol: self.symbol.clone(),
                    timestamp: candle.timestamp,
                });
            }
        }
        if self.candles.len() == self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Oldest-to-newest view of the retained candles.
    #[must_use]
    pub fn as_vec(&self) -> Vec<&Candle> {
        self.candles.iter().collect()
    }

    /// Closes in chronological order.
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candle(offset_secs: i64, close: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".into(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut window = CandleWindow::new("BTCUSDT", 3);
        for i in 0..5 {
            window.push(candle(i, 100.0 + i as f64)).unwrap();
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.closes(), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn rejects_stale_and_duplicate_timestamps() {
        let mut window = CandleWindow::new("BTCUSDT", 8);
        let first = candle(10, 100.0);
        window.push(first.clone()).unwrap();
        assert!(matches!(
            window.push(first),
            Err(FeatureError::OutOfOrderCandle { .. })
        ));
        assert!(window.push(candle(5, 99.0)).is_err());
        assert_eq!(window.len(), 1);
    }
}
