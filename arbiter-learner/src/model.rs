//! Copy-on-write linear scoring model.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbiter_core::{FeatureVector, ModelArtifact, VersionId, FEATURE_DIM};

use crate::{LearnerError, LearnerResult};

/// Immutable parameter snapshot. Scoring always runs against one coherent
/// snapshot; updates publish a fresh one instead of mutating in place.
#[derive(Clone, Debug)]
pub struct ModelParams {
    pub version: VersionId,
    pub weights: [f64; FEATURE_DIM],
    pub bias: f64,
    /// Number of online updates folded into this snapshot.
    pub updates: u64,
}

impl ModelParams {
    /// Raw linear response squashed into [-1, 1].
    #[must_use]
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let values = features.values();
        let linear: f64 = self
            .weights
            .iter()
            .zip(values.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        linear.tanh()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared handle to the live parameters of one model version.
///
/// Readers clone the `Arc` under a read lock and score lock-free from then
/// on; an update builds new params off to the side and swaps the `Arc`
/// under the write lock. Nobody ever observes a half-applied step.
#[derive(Debug)]
pub struct OnlineModel {
    params: RwLock<Arc<ModelParams>>,
    learning_rate: f64,
}

impl OnlineModel {
    /// Wraps a registered artifact, checking the weight layout against the
    /// feature schema.
    pub fn from_artifact(artifact: &ModelArtifact, learning_rate: f64) -> LearnerResult<Self> {
        if artifact.weights.len() != FEATURE_DIM {
            return Err(LearnerError::DimensionMismatch {
                expected: FEATURE_DIM,
                got: artifact.weights.len(),
            });
        }
        let mut weights = [0.0; FEATURE_DIM];
        weights.copy_from_slice(&artifact.weights);
        Ok(Self {
            params: RwLock::new(Arc::new(ModelParams {
                version: artifact.version,
                weights,
                bias: artifact.bias,
                updates: 0,
            })),
            learning_rate,
        })
    }

    /// Coherent snapshot for scoring.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ModelParams> {
        Arc::clone(&read_lock(&self.params))
    }

    /// Confidence adjustment in [-1, 1] for a candidate action.
    #[must_use]
    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.snapshot().score(features)
    }

    /// One SGD step toward `label` (a fee-normalized outcome in [-1, 1])
    /// for the decision's feature values.
    pub fn apply(&self, features: &[f64; FEATURE_DIM], label: f64) {
        let mut guard = write_lock(&self.params);
        let current = Arc::clone(&guard);
        let linear: f64 = current
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + current.bias;
        let err = label - linear.tanh();
        let mut weights = current.weights;
        for (w, x) in weights.iter_mut().zip(features.iter()) {
            *w += self.learning_rate * err * x;
        }
        *guard = Arc::new(ModelParams {
            version: current.version,
            weights,
            bias: current.bias + self.learning_rate * err,
            updates: current.updates + 1,
        });
    }
}
