//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use arbiter_broker::{
    DecisionStore, ExecutionClient, NullNotifier, PaperExecutionClient, SqliteDecisionStore,
};
use arbiter_config::AppConfig;
use arbiter_core::Candle;
use arbiter_engine::{Engine, EngineHandle};
use arbiter_registry::ModelRegistry;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

/// Short indicator windows so tests warm up in a handful of candles.
pub fn test_config(symbols: &[&str]) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.symbols = symbols.iter().map(|s| s.to_string()).collect();
    cfg.features.ma_fast = 3;
    cfg.features.ma_slow = 8;
    cfg.features.rsi_period = 5;
    cfg.features.band_period = 8;
    cfg.features.atr_window = 5;
    cfg.risk.reentry_cooldown_secs = 0;
    // Generous deadline: these tests assert semantics, not latency.
    cfg.learner.online_update_deadline_ms = 5_000;
    cfg
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

pub fn candle(symbol: &str, index: i64, close: f64, volume: f64) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        open: close * 0.999,
        high: close * 1.004,
        low: close * 0.996,
        close,
        volume,
        timestamp: base_time() + ChronoDuration::minutes(index),
    }
}

pub fn spawn_paper_engine(
    cfg: &AppConfig,
) -> (EngineHandle, Arc<SqliteDecisionStore>, Arc<ModelRegistry>) {
    let store = Arc::new(SqliteDecisionStore::new_in_memory().unwrap());
    spawn_paper_engine_with_store(cfg, store)
}

/// Variant taking a pre-seeded store, for tests that journal artifacts
/// before the engine boots.
pub fn spawn_paper_engine_with_store(
    cfg: &AppConfig,
    store: Arc<SqliteDecisionStore>,
) -> (EngineHandle, Arc<SqliteDecisionStore>, Arc<ModelRegistry>) {
    let registry = Arc::new(ModelRegistry::new());
    let fee_rate = cfg.risk.fee_rate;
    let handle = Engine::spawn(
        cfg,
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn DecisionStore>,
        Arc::new(NullNotifier),
        |feedback_tx| {
            Arc::new(PaperExecutionClient::new(fee_rate, feedback_tx)) as Arc<dyn ExecutionClient>
        },
    )
    .unwrap();
    (handle, store, registry)
}

/// Polls until the store holds `expected` decisions for the symbol.
pub async fn wait_for_decisions(store: &SqliteDecisionStore, symbol: &str, expected: usize) {
    for _ in 0..500 {
        if store.decisions_for(symbol, expected + 8).unwrap().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {expected} decisions on {symbol}, have {}",
        store.decisions_for(symbol, expected + 8).unwrap().len()
    );
}

/// Polls until the store holds `expected` feedback rows for the symbol.
pub async fn wait_for_feedback(store: &SqliteDecisionStore, symbol: &str, expected: usize) {
    for _ in 0..500 {
        if store.feedback_count(symbol).unwrap() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {expected} feedback rows on {symbol}");
}

/// A price path engineered to exercise the whole decision surface:
/// a measured climb with volume spikes (trend entries), a sharp break
/// (protective exits), then directionless chop.
pub fn scripted_closes(n: usize) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(n);
    let mut close: f64 = 100.0;
    for i in 0..n {
        let phase = i % 60;
        if phase < 30 {
            // Two steps up, one step back keeps RSI off the ceiling.
            close += if phase % 3 == 2 { -1.0 } else { 1.5 };
        } else if phase < 42 {
            close -= 2.5;
        } else {
            close += if phase % 2 == 0 { 0.4 } else { -0.4 };
        }
        let volume = if i % 5 == 0 { 40.0 } else { 10.0 };
        out.push((close.max(5.0), volume));
    }
    out
}
