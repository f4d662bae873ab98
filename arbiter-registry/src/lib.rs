//! Versioned model registry with copy-on-write assignment snapshots.
//!
//! The hot path (`resolve_active`) takes a read lock just long enough to
//! clone an `Arc` to an immutable [`Assignment`]; promotion and rollback
//! build a complete replacement snapshot off to the side and swap it in
//! under the write lock. Readers therefore observe either the whole old
//! assignment or the whole new one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbiter_core::{ModelArtifact, ModelStatus, Symbol, TraceId, VersionId, FEATURE_DIM};
use thiserror::Error;
use tracing::{info, warn};

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry-specific error type.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An artifact with this version id is already registered. The caller
    /// retries with a fresh version id.
    #[error("version conflict: {0} already registered")]
    VersionConflict(VersionId),
    /// Promotion or rollback referenced a version never registered.
    #[error("unknown version: {0}")]
    UnknownVersion(VersionId),
    /// No assignment exists for the symbol yet.
    #[error("no active model for symbol: {0}")]
    UnknownSymbol(Symbol),
    /// Traffic splits must lie in [0, 1].
    #[error("invalid traffic split: {0}")]
    InvalidSplit(f64),
    /// The artifact's weight layout does not match the feature schema.
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Immutable per-symbol routing snapshot.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub active: Arc<ModelArtifact>,
    /// Candidate artifact and its share of traffic, when an A/B test is
    /// running.
    pub candidate: Option<(Arc<ModelArtifact>, f64)>,
    /// The previously active version, kept for one-step rollback.
    previous: Option<Arc<ModelArtifact>>,
}

impl Assignment {
    /// Deterministically routes a trace to the active or candidate
    /// artifact. The same trace id always lands on the same artifact.
    #[must_use]
    pub fn route(&self, trace_id: TraceId) -> &Arc<ModelArtifact> {
        if let Some((candidate, split)) = &self.candidate {
            let bucket = u64::from_le_bytes(
                trace_id.0.as_bytes()[..8]
                    .try_into()
                    .unwrap_or([0u8; 8]),
            ) % 10_000;
            if (bucket as f64) < split * 10_000.0 {
                return candidate;
            }
        }
        &self.active
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

/// In-memory model registry. Durable metadata is journaled by the caller
/// through its decision store; the hot path never touches disk.
#[derive(Default)]
pub struct ModelRegistry {
    artifacts: RwLock<HashMap<VersionId, Arc<ModelArtifact>>>,
    assignments: RwLock<HashMap<Symbol, Arc<Assignment>>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a candidate artifact. Version ids are write-once.
    pub fn register(&self, artifact: ModelArtifact) -> RegistryResult<VersionId> {
        if artifact.weights.len() != FEATURE_DIM || artifact.feature_dim != FEATURE_DIM {
            return Err(RegistryError::DimensionMismatch {
                expected: FEATURE_DIM,
                got: artifact.weights.len(),
            });
        }
        let version = artifact.version;
        let mut artifacts = write_lock(&self.artifacts);
        if artifacts.contains_key(&version) {
            return Err(RegistryError::VersionConflict(version));
        }
        artifacts.insert(version, Arc::new(artifact));
        info!(target: "arbiter.registry", %version, "registered artifact");
        Ok(version)
    }

    fn artifact(&self, version: VersionId) -> RegistryResult<Arc<ModelArtifact>> {
        read_lock(&self.artifacts)
            .get(&version)
            .cloned()
            .ok_or(RegistryError::UnknownVersion(version))
    }

    fn with_status(artifact: &Arc<ModelArtifact>, status: ModelStatus) -> Arc<ModelArtifact> {
        let mut updated = artifact.as_ref().clone();
        updated.status = status;
        Arc::new(updated)
    }

    /// Promotes a registered version for a symbol.
    ///
    /// With `traffic_split >= 1.0` the version becomes the sole active
    /// model and the old active is retired (but kept for rollback). A
    /// partial split installs the version as candidate next to the
    /// current active. The swap is a single pointer store; concurrent
    /// `resolve_active` calls see the old or the new assignment in full.
    pub fn promote(
        &self,
        symbol: &str,
        version: VersionId,
        traffic_split: f64,
    ) -> RegistryResult<()> {
        if !(0.0..=1.0).contains(&traffic_split) {
            return Err(RegistryError::InvalidSplit(traffic_split));
        }
        let artifact = self.artifact(version)?;

        let mut assignments = write_lock(&self.assignments);
        let current = assignments.get(symbol).cloned();
        let next = match current {
            Some(current) if traffic_split < 1.0 => Assignment {
                active: Arc::clone(&current.active),
                candidate: Some((artifact, traffic_split)),
                previous: current.previous.clone(),
            },
            Some(current) => {
                let retired = Self::with_status(&current.active, ModelStatus::Retired);
                {
                    let mut artifacts = write_lock(&self.artifacts);
                    artifacts.insert(retired.version, Arc::clone(&retired));
                }
                Assignment {
                    active: Self::with_status(&artifact, ModelStatus::Active),
                    candidate: None,
                    previous: Some(retired),
                }
            }
            // First promotion bootstraps the symbol regardless of split.
            None => Assignment {
                active: Self::with_status(&artifact, ModelStatus::Active),
                candidate: None,
                previous: None,
            },
        };
        {
            let mut artifacts = write_lock(&self.artifacts);
            artifacts.insert(next.active.version, Arc::clone(&next.active));
        }
        assignments.insert(symbol.to_string(), Arc::new(next));
        info!(
            target: "arbiter.registry",
            symbol,
            %version,
            traffic_split,
            "promoted artifact"
        );
        Ok(())
    }

    /// Resolves the artifact a trace should score against. Lock is held
    /// only for the `Arc` clone.
    pub fn resolve_active(
        &self,
        symbol: &str,
        trace_id: TraceId,
    ) -> RegistryResult<Arc<ModelArtifact>> {
        let assignment = read_lock(&self.assignments)
            .get(symbol)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSymbol(symbol.to_string()))?;
        Ok(Arc::clone(assignment.route(trace_id)))
    }

    /// Full routing snapshot, used by the engine as its last-known-good
    /// cache for degraded operation.
    pub fn snapshot(&self, symbol: &str) -> Option<Arc<Assignment>> {
        read_lock(&self.assignments).get(symbol).cloned()
    }

    /// Reverts the symbol to the immediately prior active version.
    /// Repeated calls are no-ops until another promotion happens.
    pub fn rollback(&self, symbol: &str) -> RegistryResult<Option<VersionId>> {
        let mut assignments = write_lock(&self.assignments);
        let current = assignments
            .get(symbol)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSymbol(symbol.to_string()))?;
        let Some(previous) = current.previous.clone() else {
            return Ok(None);
        };
        let restored = Self::with_status(&previous, ModelStatus::Active);
        let demoted = Self::with_status(&current.active, ModelStatus::Retired);
        {
            let mut artifacts = write_lock(&self.artifacts);
            artifacts.insert(restored.version, Arc::clone(&restored));
            artifacts.insert(demoted.version, demoted);
        }
        let version = restored.version;
        assignments.insert(
            symbol.to_string(),
            Arc::new(Assignment {
                active: restored,
                candidate: None,
                previous: None,
            }),
        );
        warn!(target: "arbiter.registry", symbol, %version, "rolled back active model");
        Ok(Some(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ModelArtifact {
        ModelArtifact::seed()
    }

    #[test]
    fn register_rejects_duplicate_versions() {
        let registry = ModelRegistry::new();
        let a = artifact();
        let version = registry.register(a.clone()).unwrap();
        assert!(matches!(
            registry.register(a),
            Err(RegistryError::VersionConflict(v)) if v == version
        ));
    }

    #[test]
    fn register_rejects_bad_layouts() {
        let registry = ModelRegistry::new();
        let mut a = artifact();
        a.weights.pop();
        assert!(matches!(
            registry.register(a),
            Err(RegistryError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn resolve_before_promotion_is_unknown_symbol() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.resolve_active("BTCUSDT", TraceId::new()),
            Err(RegistryError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn full_promotion_replaces_and_retires() {
        let registry = ModelRegistry::new();
        let first = registry.register(artifact()).unwrap();
        let second = registry.register(artifact()).unwrap();
        registry.promote("BTCUSDT", first, 1.0).unwrap();
        registry.promote("BTCUSDT", second, 1.0).unwrap();
        let resolved = registry.resolve_active("BTCUSDT", TraceId::new()).unwrap();
        assert_eq!(resolved.version, second);
        assert_eq!(resolved.status, ModelStatus::Active);
    }

    #[test]
    fn partial_split_routes_deterministically() {
        let registry = ModelRegistry::new();
        let active = registry.register(artifact()).unwrap();
        let candidate = registry.register(artifact()).unwrap();
        registry.promote("BTCUSDT", active, 1.0).unwrap();
        registry.promote("BTCUSDT", candidate, 0.3).unwrap();

        let mut saw_candidate = false;
        let mut saw_active = false;
        for _ in 0..200 {
            let trace = TraceId::new();
            let first = registry.resolve_active("BTCUSDT", trace).unwrap();
            // Same trace, same artifact, every time.
            for _ in 0..5 {
                let again = registry.resolve_active("BTCUSDT", trace).unwrap();
                assert_eq!(again.version, first.version);
            }
            if first.version == candidate {
                saw_candidate = true;
            } else {
                assert_eq!(first.version, active);
                saw_active = true;
            }
        }
        assert!(saw_candidate && saw_active, "split should route both ways");
    }

    #[test]
    fn invalid_split_is_rejected() {
        let registry = ModelRegistry::new();
        let version = registry.register(artifact()).unwrap();
        assert!(matches!(
            registry.promote("BTCUSDT", version, 1.5),
            Err(RegistryError::InvalidSplit(_))
        ));
    }

    #[test]
    fn rollback_is_idempotent() {
        let registry = ModelRegistry::new();
        let first = registry.register(artifact()).unwrap();
        let second = registry.register(artifact()).unwrap();
        registry.promote("BTCUSDT", first, 1.0).unwrap();
        registry.promote("BTCUSDT", second, 1.0).unwrap();

        assert_eq!(registry.rollback("BTCUSDT").unwrap(), Some(first));
        let resolved = registry.resolve_active("BTCUSDT", TraceId::new()).unwrap();
        assert_eq!(resolved.version, first);
        // Nothing older to fall back to: explicit no-op.
        assert_eq!(registry.rollback("BTCUSDT").unwrap(), None);
        let resolved = registry.resolve_active("BTCUSDT", TraceId::new()).unwrap();
        assert_eq!(resolved.version, first);
    }
}
