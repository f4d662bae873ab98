//! Journaled offline candidates re-enter traffic when the engine boots.

mod common;

use std::sync::Arc;

use arbiter_broker::{DecisionStore, SqliteDecisionStore};
use arbiter_core::{ModelArtifact, ModelLineage};

use common::{candle, spawn_paper_engine_with_store, test_config, wait_for_decisions};

fn offline_candidate() -> ModelArtifact {
    let mut artifact = ModelArtifact::seed();
    artifact.lineage = ModelLineage::Offline;
    artifact.weights[0] = 0.4;
    artifact
}

fn seeded_store(candidate: &ModelArtifact) -> Arc<SqliteDecisionStore> {
    let store = Arc::new(SqliteDecisionStore::new_in_memory().unwrap());
    store.record_artifact(candidate).unwrap();
    store
}

// With a full default split the journaled candidate replaces the seed as
// the sole active model, so every decision scores against its version.
#[tokio::test]
async fn full_default_split_promotes_the_journaled_candidate() {
    let mut cfg = test_config(&["BTCUSDT"]);
    cfg.registry.traffic_split_default = 1.0;
    let candidate = offline_candidate();
    let (handle, store, _registry) =
        spawn_paper_engine_with_store(&cfg, seeded_store(&candidate));

    let n = 20usize;
    for i in 0..n {
        handle
            .dispatch_candle(candle("BTCUSDT", i as i64, 100.0 + i as f64 * 0.1, 10.0))
            .await
            .unwrap();
    }
    wait_for_decisions(&store, "BTCUSDT", n).await;

    let decisions = store.decisions_for("BTCUSDT", n + 8).unwrap();
    // Warm-up holds carry no model version; everything scored afterwards
    // must have gone through the promoted candidate.
    let versions: Vec<_> = decisions.iter().filter_map(|d| d.model_version).collect();
    assert!(!versions.is_empty(), "post-warmup decisions should be scored");
    assert!(versions.iter().all(|v| *v == candidate.version));
    handle.shutdown().await;
}

// A partial default split installs the candidate next to the seeded
// active model instead of replacing it.
#[tokio::test]
async fn partial_default_split_installs_a_side_by_side_candidate() {
    let mut cfg = test_config(&["BTCUSDT"]);
    cfg.registry.traffic_split_default = 0.25;
    let candidate = offline_candidate();
    let (handle, _store, registry) =
        spawn_paper_engine_with_store(&cfg, seeded_store(&candidate));

    let assignment = registry.snapshot("BTCUSDT").unwrap();
    let (routed, split) = assignment.candidate.as_ref().expect("candidate installed");
    assert_eq!(routed.version, candidate.version);
    assert_eq!(*split, 0.25);
    assert_ne!(assignment.active.version, candidate.version);
    handle.shutdown().await;
}

// An empty journal leaves the seeded assignment untouched.
#[tokio::test]
async fn no_journaled_candidate_means_no_split() {
    let cfg = test_config(&["BTCUSDT"]);
    let store = Arc::new(SqliteDecisionStore::new_in_memory().unwrap());
    let (handle, _store, registry) = spawn_paper_engine_with_store(&cfg, store);

    let assignment = registry.snapshot("BTCUSDT").unwrap();
    assert!(assignment.candidate.is_none());
    handle.shutdown().await;
}
