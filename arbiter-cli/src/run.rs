//! Live/paper engine runtime fed by a candle stream on stdin.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arbiter_broker::{
    DecisionStore, ExecutionClient, PaperExecutionClient, SqliteDecisionStore, WebhookNotifier,
};
use arbiter_config::AppConfig;
use arbiter_core::Candle;
use arbiter_engine::Engine;
use arbiter_learner::GradientTrainer;
use arbiter_registry::ModelRegistry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

pub async fn run(config: AppConfig) -> Result<()> {
    if !config.dry_run {
        // Venue connectivity lives outside this tree; the engine only
        // ships with the simulated client.
        bail!("no live execution connector is wired into this build; set dry_run = true");
    }
    let store = Arc::new(
        SqliteDecisionStore::new(&config.store_path).context("opening decision store")?,
    );
    let registry = Arc::new(ModelRegistry::new());
    let notifier = Arc::new(WebhookNotifier::new(config.alerting.webhook_url.clone()));
    let fee_rate = config.risk.fee_rate;
    let handle = Engine::spawn(
        &config,
        registry,
        Arc::clone(&store) as Arc<dyn DecisionStore>,
        notifier,
        |feedback_tx| {
            Arc::new(PaperExecutionClient::new(fee_rate, feedback_tx)) as Arc<dyn ExecutionClient>
        },
    )?;

    info!(
        symbols = ?config.symbols,
        store = %config.store_path.display(),
        "engine running; feed JSON candles on stdin, ctrl-c to stop"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<Candle>(&line) {
                    Ok(candle) => {
                        if let Err(err) = handle.dispatch_candle(candle).await {
                            warn!(%err, "dropped candle");
                        }
                    }
                    Err(err) => warn!(%err, "unparseable candle line"),
                },
                Ok(None) => {
                    info!("candle stream ended");
                    break;
                }
                Err(err) => {
                    error!(%err, "stdin read failed");
                    break;
                }
            },
        }
    }

    handle.shutdown().await;
    info!("engine stopped");
    Ok(())
}

/// Offline training pass over the persisted corpus. Produces and journals
/// a candidate artifact; the next engine start picks it up at the
/// configured default traffic split.
pub fn train(config: &AppConfig, symbol: &str) -> Result<()> {
    let store =
        SqliteDecisionStore::new(&config.store_path).context("opening decision store")?;
    let trainer = GradientTrainer::default();
    let artifact = arbiter_engine::train_candidate(&store, &trainer, symbol)?;
    info!(
        symbol,
        version = %artifact.version,
        samples = artifact.trained_samples,
        mse = artifact.metrics.get("mse").copied().unwrap_or_default(),
        "candidate trained and journaled"
    );
    Ok(())
}
