//! Offline training contract and the reference batch trainer.

use arbiter_core::{ModelArtifact, ModelLineage, ModelStatus, TraceId, VersionId, FEATURE_DIM};
use chrono::Utc;
use tracing::info;

use crate::{LearnerError, LearnerResult};

/// One joined decision/outcome row. The label is the fee-normalized net
/// P&L in [-1, 1]; callers relabel gross outcomes through the risk
/// calculator before building samples so fee handling stays in one place.
#[derive(Clone, Debug)]
pub struct LabeledSample {
    pub trace_id: TraceId,
    pub features: [f64; FEATURE_DIM],
    pub label: f64,
}

/// Batch training boundary.
///
/// Implementations read an immutable corpus snapshot and produce a
/// candidate artifact of offline lineage. They never mutate registry
/// state; promotion is a separate, explicit step.
pub trait OfflineTrainer: Send + Sync {
    fn train(&self, samples: &[LabeledSample]) -> LearnerResult<ModelArtifact>;
}

/// Full-batch gradient descent on the same squashed-linear family the
/// online model scores with. Deliberately small; heavier model families
/// plug in behind [`OfflineTrainer`] without engine changes.
#[derive(Clone, Debug)]
pub struct GradientTrainer {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for GradientTrainer {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.05,
            l2: 1e-3,
        }
    }
}

impl OfflineTrainer for GradientTrainer {
    fn train(&self, samples: &[LabeledSample]) -> LearnerResult<ModelArtifact> {
        if samples.is_empty() {
            return Err(LearnerError::EmptyCorpus);
        }
        let n = samples.len() as f64;
        let mut weights = [0.0_f64; FEATURE_DIM];
        let mut bias = 0.0_f64;

        for _ in 0..self.epochs {
            let mut grad_w = [0.0_f64; FEATURE_DIM];
            let mut grad_b = 0.0_f64;
            for sample in samples {
                let linear: f64 = weights
                    .iter()
                    .zip(sample.features.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + bias;
                let err = sample.label - linear.tanh();
                for (g, x) in grad_w.iter_mut().zip(sample.features.iter()) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(grad_w.iter()) {
                *w += self.learning_rate * (g / n - self.l2 * *w);
            }
            bias += self.learning_rate * grad_b / n;
        }

        let mse = samples
            .iter()
            .map(|s| {
                let linear: f64 = weights
                    .iter()
                    .zip(s.features.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + bias;
                (s.label - linear.tanh()).powi(2)
            })
            .sum::<f64>()
            / n;

        let mut metrics = std::collections::BTreeMap::new();
        metrics.insert("mse".to_string(), mse);
        metrics.insert("samples".to_string(), n);

        let artifact = ModelArtifact {
            version: VersionId::new(),
            lineage: ModelLineage::Offline,
            created_at: Utc::now(),
            feature_dim: FEATURE_DIM,
            weights: weights.to_vec(),
            bias,
            trained_samples: samples.len(),
            status: ModelStatus::Candidate,
            metrics,
        };
        info!(
            target: "arbiter.trainer",
            version = %artifact.version,
            lineage = %artifact.lineage,
            samples = samples.len(),
            mse,
            "trained candidate artifact"
        );
        Ok(artifact)
    }
}
