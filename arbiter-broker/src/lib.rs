//! External collaborator seams: execution, persistence, notification.
//!
//! The engine only ever talks to the traits in this crate. The in-tree
//! implementations (paper execution, sqlite store, webhook notifier) are
//! enough to run the whole pipeline locally; real venue connectors
//! implement the same traits out of tree.

pub mod alerts;
pub mod paper;
pub mod store;

pub use alerts::{NullNotifier, Severity, WebhookNotifier};
pub use paper::PaperExecutionClient;
pub use store::SqliteDecisionStore;

use arbiter_core::{
    Decision, ExecutionAck, FeatureVector, FillFeedback, ModelArtifact, Position, Symbol, TraceId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Result alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker-side error taxonomy.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Network or I/O failure talking to a collaborator.
    #[error("transport error: {0}")]
    Transport(String),
    /// The collaborator refused the request outright.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Persistence layer failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hands decisions to a venue (or its simulation).
///
/// `submit` returns synchronously with an ack; fills stream back later on
/// the feedback channel supplied at construction. A `Rejected` ack is a
/// normal outcome, not an error.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a decision. For exits the currently open position is passed
    /// along so simulations can settle P&L.
    async fn submit(
        &self,
        decision: &Decision,
        position: Option<&Position>,
    ) -> BrokerResult<ExecutionAck>;
}

/// Append-only persistence for the audit trail and the training corpus.
pub trait DecisionStore: Send + Sync {
    fn record_features(&self, features: &FeatureVector, trace_id: TraceId) -> BrokerResult<()>;
    fn record_decision(&self, decision: &Decision) -> BrokerResult<()>;
    fn record_feedback(&self, feedback: &FillFeedback) -> BrokerResult<()>;
    fn record_artifact(&self, artifact: &ModelArtifact) -> BrokerResult<()>;

    fn decision(&self, trace_id: TraceId) -> BrokerResult<Option<Decision>>;
    fn decisions_for(&self, symbol: &str, limit: usize) -> BrokerResult<Vec<Decision>>;
    fn feedback_count(&self, symbol: &str) -> BrokerResult<usize>;

    /// Feature vectors joined with their closing feedback, oldest first.
    /// This is the offline trainer's corpus snapshot.
    fn training_rows(&self, symbol: &str) -> BrokerResult<Vec<(FeatureVector, FillFeedback)>>;

    /// Most recently journaled offline-trained artifact, if any. The
    /// engine installs it as the A/B candidate on startup.
    fn latest_offline_candidate(&self) -> BrokerResult<Option<ModelArtifact>>;
}

/// One-way operational notifications. Send failures must never propagate
/// into the decision path.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, severity: Severity, symbol: &Symbol, message: &str);
}
