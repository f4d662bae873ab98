//! Offline training entry point.

use anyhow::{Context, Result};
use arbiter_broker::DecisionStore;
use arbiter_core::ModelArtifact;
use arbiter_learner::{outcome_label, LabeledSample, OfflineTrainer};
use tracing::info;

/// Trains a candidate artifact from the symbol's persisted corpus.
///
/// Reads an immutable snapshot of closed trades, relabels each outcome net
/// of fees, and hands the corpus to the trainer. The resulting artifact is
/// journaled but NOT promoted; routing live traffic at it is a separate,
/// explicit registry call.
pub fn train_candidate(
    store: &dyn DecisionStore,
    trainer: &dyn OfflineTrainer,
    symbol: &str,
) -> Result<ModelArtifact> {
    let rows = store
        .training_rows(symbol)
        .with_context(|| format!("loading training corpus for {symbol}"))?;
    let samples: Vec<LabeledSample> = rows
        .iter()
        .filter_map(|(features, feedback)| {
            feedback.realized_pnl_net.map(|net| LabeledSample {
                trace_id: feedback.trace_id,
                features: features.values(),
                label: outcome_label(net, feedback.fill_price * feedback.size),
            })
        })
        .collect();
    let artifact = trainer
        .train(&samples)
        .with_context(|| format!("training candidate for {symbol}"))?;
    store
        .record_artifact(&artifact)
        .context("journaling candidate artifact")?;
    info!(
        target: "arbiter.engine",
        symbol,
        version = %artifact.version,
        samples = samples.len(),
        "candidate artifact ready"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_broker::SqliteDecisionStore;
    use arbiter_core::{FeatureVector, FillFeedback, ModelLineage, ModelStatus, Side, TraceId};
    use arbiter_learner::GradientTrainer;
    use chrono::Utc;

    fn seed_corpus(store: &SqliteDecisionStore, n: usize) {
        for i in 0..n {
            let trace = TraceId::new();
            let ret = if i % 2 == 0 { 0.01 } else { -0.01 };
            let features = FeatureVector {
                symbol: "BTCUSDT".into(),
                timestamp: Utc::now(),
                ret_1: ret,
                momentum: ret,
                ma_ratio: 1.0 + ret,
                volatility: 0.01,
                volume_ratio: 1.4,
                rsi: 50.0,
                band_position: 0.5,
                win_rate: 0.5,
                fee_drag: 0.001,
                atr: 2.0,
                close: 100.0,
            };
            store.record_features(&features, trace).unwrap();
            store
                .record_feedback(&FillFeedback {
                    trace_id: trace,
                    symbol: "BTCUSDT".into(),
                    side: Side::Sell,
                    fill_price: 100.0,
                    size: 1.0,
                    fee_paid: 0.1,
                    closed: true,
                    realized_pnl_net: Some(ret * 50.0),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
    }

    #[test]
    fn trains_a_candidate_from_the_store() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        seed_corpus(&store, 20);
        let trainer = GradientTrainer::default();
        let artifact = train_candidate(&store, &trainer, "BTCUSDT").unwrap();
        assert_eq!(artifact.status, ModelStatus::Candidate);
        assert_eq!(artifact.lineage, ModelLineage::Offline);
        assert_eq!(artifact.trained_samples, 20);
    }

    #[test]
    fn empty_corpus_surfaces_as_error() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        let trainer = GradientTrainer::default();
        assert!(train_candidate(&store, &trainer, "BTCUSDT").is_err());
    }
}
