//! Deterministic synthetic replay for pipeline smoke checks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arbiter_broker::{
    DecisionStore, ExecutionClient, NullNotifier, PaperExecutionClient, SqliteDecisionStore,
};
use arbiter_config::AppConfig;
use arbiter_core::Candle;
use arbiter_engine::Engine;
use arbiter_registry::ModelRegistry;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tracing::info;

/// Synthesizes a wavy but deterministic candle series: trending sweeps
/// with periodic volume bursts, enough to exercise entries, exits, and
/// the learner loop without any market connectivity.
fn synth_candles(symbol: &str, count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + 8.0 * (t * 0.08).sin() + 3.0 * (t * 0.23).sin();
            let volume = if i % 6 == 0 { 35.0 } else { 10.0 };
            Candle {
                symbol: symbol.to_string(),
                open: close - 0.2,
                high: close + 0.6,
                low: close - 0.6,
                close,
                volume,
                timestamp: start + ChronoDuration::minutes(i as i64),
            }
        })
        .collect()
}

pub async fn replay(config: AppConfig, candles: usize) -> Result<()> {
    let store = Arc::new(SqliteDecisionStore::new_in_memory().context("opening replay store")?);
    let registry = Arc::new(ModelRegistry::new());
    let fee_rate = config.risk.fee_rate;
    let handle = Engine::spawn(
        &config,
        registry,
        Arc::clone(&store) as Arc<dyn DecisionStore>,
        Arc::new(NullNotifier),
        |feedback_tx| {
            Arc::new(PaperExecutionClient::new(fee_rate, feedback_tx)) as Arc<dyn ExecutionClient>
        },
    )?;

    for symbol in &config.symbols {
        for candle in synth_candles(symbol, candles) {
            handle.dispatch_candle(candle).await?;
        }
    }

    // Let the workers drain their queues before reading the tape.
    for symbol in &config.symbols {
        for _ in 0..500 {
            if store.decisions_for(symbol, candles + 8)?.len() >= candles {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    for symbol in &config.symbols {
        let decisions = store.decisions_for(symbol, candles + 8)?;
        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for decision in &decisions {
            *by_kind.entry(decision.action.kind()).or_default() += 1;
        }
        info!(
            %symbol,
            decisions = decisions.len(),
            breakdown = ?by_kind,
            feedback = store.feedback_count(symbol)?,
            "replay finished"
        );
    }

    handle.shutdown().await;
    Ok(())
}
