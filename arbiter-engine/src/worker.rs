//! Per-symbol decision cycle.

use std::sync::Arc;
use std::time::Duration;

use arbiter_broker::{DecisionStore, ExecutionClient, Notifier, Severity};
use arbiter_config::AppConfig;
use arbiter_core::{
    Candle, Decision, DecisionAction, ExecutionAck, FeatureVector, FillFeedback, ModelArtifact,
    Position, ProposedAction, Symbol, TraceId, VersionId,
};
use arbiter_features::{
    CandleWindow, ExecutionSummary, FeatureBuilder, FeatureError, RegimeFilter, RiskCalculator,
};
use arbiter_learner::{LearnerError, OnlineLearner};
use arbiter_registry::{Assignment, ModelRegistry, RegistryError};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::safety::SafetyMonitor;
use crate::ShutdownSignal;

/// Scores a feature vector against an artifact's static weights. Used for
/// candidate routing, where online updates do not apply.
fn artifact_score(artifact: &ModelArtifact, features: &FeatureVector) -> f64 {
    let values = features.values();
    let linear: f64 = artifact
        .weights
        .iter()
        .zip(values.iter())
        .map(|(w, x)| w * x)
        .sum::<f64>()
        + artifact.bias;
    linear.tanh()
}

/// Owns everything one symbol needs to turn candles into decisions.
///
/// A worker is a single task: candles and feedback for its symbol are
/// processed strictly sequentially, so cycles never interleave and the
/// at-most-one-position invariant reduces to local state. Feedback is
/// drained ahead of the next candle.
pub(crate) struct SymbolWorker {
    symbol: Symbol,
    window: CandleWindow,
    builder: FeatureBuilder,
    regime_filter: RegimeFilter,
    risk: RiskCalculator,
    selector: arbiter_strategy::StrategySelector,
    learner: OnlineLearner,
    registry: Arc<ModelRegistry>,
    /// Last-known-good routing snapshot for degraded operation.
    cached_assignment: Option<Arc<Assignment>>,
    active_version: VersionId,
    client: Arc<dyn ExecutionClient>,
    store: Arc<dyn DecisionStore>,
    notifier: Arc<dyn Notifier>,
    safety: Arc<SafetyMonitor>,
    position: Option<Position>,
    /// An exit was accepted but its closing fill has not landed yet.
    pending_close: bool,
    last_exit_at: Option<DateTime<Utc>>,
    score_deadline: Duration,
    learning_rate: f64,
    base_size: f64,
    reentry_cooldown: chrono::Duration,
    dry_run: bool,
}

impl SymbolWorker {
    pub(crate) fn new(
        config: &AppConfig,
        symbol: Symbol,
        registry: Arc<ModelRegistry>,
        store: Arc<dyn DecisionStore>,
        notifier: Arc<dyn Notifier>,
        client: Arc<dyn ExecutionClient>,
        safety: Arc<SafetyMonitor>,
    ) -> anyhow::Result<Self> {
        // Bootstrap symbols that have never been assigned a model.
        if registry.snapshot(&symbol).is_none() {
            let seed = ModelArtifact::seed();
            let version = registry.register(seed.clone())?;
            registry.promote(&symbol, version, 1.0)?;
            store.record_artifact(&seed)?;
            info!(target: "arbiter.engine", %symbol, %version, "seeded model assignment");
            Self::install_journaled_candidate(
                &registry,
                store.as_ref(),
                &symbol,
                config.registry.traffic_split_default,
            );
        }
        let assignment = registry
            .snapshot(&symbol)
            .ok_or_else(|| anyhow::anyhow!("registry lost assignment for {symbol}"))?;
        let learner = OnlineLearner::new(
            &assignment.active,
            config.learner.learning_rate,
            config.learner.recent_window,
        )?;
        let window_capacity = config.features.min_history() + 32;
        Ok(Self {
            window: CandleWindow::new(symbol.clone(), window_capacity),
            builder: FeatureBuilder::new(config.features.clone()),
            regime_filter: RegimeFilter::new(&config.features),
            risk: RiskCalculator::new(&config.risk),
            selector: arbiter_strategy::StrategySelector::with_defaults(&config.strategy),
            active_version: assignment.active.version,
            cached_assignment: Some(assignment),
            learner,
            registry,
            client,
            store,
            notifier,
            safety,
            position: None,
            pending_close: false,
            last_exit_at: None,
            score_deadline: Duration::from_millis(config.learner.online_update_deadline_ms),
            learning_rate: config.learner.learning_rate,
            base_size: config.risk.base_size,
            reentry_cooldown: chrono::Duration::seconds(config.risk.reentry_cooldown_secs as i64),
            dry_run: config.dry_run,
            symbol,
        })
    }

    /// Re-enters the newest journaled offline artifact into traffic at the
    /// configured default split. A split of zero disables the mechanism; a
    /// full split makes the candidate the sole active model.
    fn install_journaled_candidate(
        registry: &ModelRegistry,
        store: &dyn DecisionStore,
        symbol: &Symbol,
        split: f64,
    ) {
        if split <= 0.0 {
            return;
        }
        let candidate = match store.latest_offline_candidate() {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return,
            Err(err) => {
                warn!(target: "arbiter.engine", %symbol, %err, "candidate lookup failed");
                return;
            }
        };
        let version = candidate.version;
        match registry.register(candidate) {
            // Another symbol's worker may have registered it already.
            Ok(_) | Err(RegistryError::VersionConflict(_)) => {}
            Err(err) => {
                warn!(target: "arbiter.engine", %symbol, %err, "journaled candidate rejected");
                return;
            }
        }
        match registry.promote(symbol, version, split) {
            Ok(()) => {
                info!(
                    target: "arbiter.engine",
                    %symbol,
                    %version,
                    split,
                    "installed journaled candidate"
                );
            }
            Err(err) => {
                warn!(target: "arbiter.engine", %symbol, %err, "candidate promotion failed");
            }
        }
    }

    pub(crate) async fn run(
        mut self,
        mut candles: mpsc::Receiver<Candle>,
        mut feedback: mpsc::Receiver<FillFeedback>,
        shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                Some(fb) = feedback.recv() => self.on_feedback(fb).await,
                maybe_candle = candles.recv() => match maybe_candle {
                    Some(candle) => self.on_candle(candle).await,
                    None => break,
                },
            }
        }
        info!(target: "arbiter.engine", symbol = %self.symbol, "worker stopped");
    }

    /// One full decision cycle. Exactly one decision is emitted per
    /// accepted candle; every failure path degrades to an explicit hold.
    async fn on_candle(&mut self, candle: Candle) {
        let close = candle.close;
        let timestamp = candle.timestamp;
        if let Err(err) = self.window.push(candle) {
            warn!(target: "arbiter.engine", symbol = %self.symbol, %err, "discarding candle");
            return;
        }
        let trace_id = TraceId::new();

        let stats = self.learner.stats();
        let summary = ExecutionSummary {
            win_rate: stats.win_rate,
            fee_drag: stats.fee_drag,
        };
        let features = match self.builder.build(&self.window, &summary) {
            Ok(features) => features,
            Err(FeatureError::InsufficientHistory { have, need, .. }) => {
                debug!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    %trace_id,
                    have,
                    need,
                    "warming up"
                );
                self.emit_hold(trace_id, close, timestamp, None).await;
                return;
            }
            Err(err) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, %err, "feature build failed");
                self.emit_hold(trace_id, close, timestamp, None).await;
                return;
            }
        };
        if let Err(err) = self.store.record_features(&features, trace_id) {
            warn!(target: "arbiter.engine", %trace_id, %err, "feature persistence failed");
        }

        let regime = self.regime_filter.classify(&features);
        let artifact = self.resolve_model(trace_id);
        let model_version = artifact.as_ref().map(|a| a.version);

        let proposal = if self.pending_close {
            // An exit is in flight; do not pile further actions on top.
            None
        } else {
            match self.selector.select(&features, regime, self.position.as_ref()) {
                Ok(proposal) => proposal,
                Err(err) => {
                    error!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, %err, "selection failed");
                    self.notifier
                        .notify(Severity::Warning, &self.symbol, &format!("selection failed: {err}"))
                        .await;
                    None
                }
            }
        };
        let Some(proposal) = proposal else {
            self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                .await;
            return;
        };

        let adjustment = match &artifact {
            Some(artifact) => self.score(&features, artifact).await,
            None => {
                warn!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    %trace_id,
                    "no model available, scoring neutral"
                );
                0.0
            }
        };
        let confidence = (proposal.confidence * (1.0 + 0.3 * adjustment)).clamp(0.0, 1.0);

        debug!(
            target: "arbiter.engine",
            symbol = %self.symbol,
            %trace_id,
            %regime,
            strategy = %proposal.strategy,
            action = proposal.action.kind(),
            reason = %proposal.reason,
            confidence,
            "cycle resolved"
        );

        match proposal.action.clone() {
            DecisionAction::Enter { side, .. } => {
                self.handle_entry(trace_id, &features, &proposal, side, confidence, model_version)
                    .await;
            }
            DecisionAction::Exit { reason } => {
                self.handle_exit(trace_id, &features, &proposal, reason, confidence, model_version)
                    .await;
            }
            DecisionAction::Adjust { stop_loss } => {
                self.handle_adjust(trace_id, &features, &proposal, stop_loss, confidence, model_version)
                    .await;
            }
            DecisionAction::Hold => {
                self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                    .await;
            }
        }
    }

    /// Routes the trace through the registry, falling back to the cached
    /// snapshot when the registry has no answer. Rebinds the learner when
    /// a promotion changed the active version.
    fn resolve_model(&mut self, trace_id: TraceId) -> Option<Arc<ModelArtifact>> {
        match self.registry.snapshot(&self.symbol) {
            Some(assignment) => {
                if assignment.active.version != self.active_version {
                    match self
                        .learner
                        .replace_model(&assignment.active, self.learning_rate)
                    {
                        Ok(()) => {
                            info!(
                                target: "arbiter.engine",
                                symbol = %self.symbol,
                                from = %self.active_version,
                                to = %assignment.active.version,
                                "rebound learner to promoted model"
                            );
                            self.active_version = assignment.active.version;
                        }
                        Err(err) => {
                            error!(target: "arbiter.engine", %err, "promoted model unusable, keeping previous");
                        }
                    }
                }
                let routed = Arc::clone(assignment.route(trace_id));
                self.cached_assignment = Some(assignment);
                Some(routed)
            }
            None => {
                warn!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    "registry unavailable, using cached assignment"
                );
                self.cached_assignment
                    .as_ref()
                    .map(|assignment| Arc::clone(assignment.route(trace_id)))
            }
        }
    }

    /// Model scoring under the configured deadline. A timeout yields the
    /// neutral adjustment; the cycle never blocks on a slow model.
    async fn score(&self, features: &FeatureVector, artifact: &Arc<ModelArtifact>) -> f64 {
        let features = features.clone();
        let task = if artifact.version == self.active_version {
            let model = self.learner.model();
            tokio::task::spawn_blocking(move || model.score(&features))
        } else {
            let artifact = Arc::clone(artifact);
            tokio::task::spawn_blocking(move || artifact_score(&artifact, &features))
        };
        match tokio::time::timeout(self.score_deadline, task).await {
            Ok(Ok(score)) => score,
            Ok(Err(err)) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %err, "scoring task failed");
                0.0
            }
            Err(_) => {
                warn!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    deadline_ms = self.score_deadline.as_millis() as u64,
                    "score deadline exceeded, using neutral adjustment"
                );
                0.0
            }
        }
    }

    async fn handle_entry(
        &mut self,
        trace_id: TraceId,
        features: &FeatureVector,
        proposal: &ProposedAction,
        side: arbiter_core::Side,
        confidence: f64,
        model_version: Option<VersionId>,
    ) {
        // Local invariant guard: the selector should never propose an
        // entry while a position is open, but the position ledger is the
        // authority.
        if self.position.is_some() {
            warn!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, "entry proposed over open position");
            self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                .await;
            return;
        }
        if let Some(reason) = self.safety.entries_paused(features.timestamp) {
            info!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, reason, "entries paused");
            self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                .await;
            return;
        }
        if let (Some(exited_at), true) = (
            self.last_exit_at,
            self.reentry_cooldown > chrono::Duration::zero(),
        ) {
            if features.timestamp - exited_at < self.reentry_cooldown {
                debug!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, "re-entry cooldown");
                self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                    .await;
                return;
            }
        }
        if !self.safety.try_reserve_slot() {
            info!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, "position cap reached");
            self.emit_hold(trace_id, features.close, features.timestamp, model_version)
                .await;
            return;
        }

        // Allocation scales with conviction.
        let size = self.base_size * confidence;
        let targets = self.risk.targets(features.close, side, features.atr);
        let decision = Decision {
            trace_id,
            symbol: self.symbol.clone(),
            timestamp: features.timestamp,
            action: DecisionAction::Enter { side, size },
            confidence,
            strategy: Some(proposal.strategy.clone()),
            model_version,
            reference_price: features.close,
            targets: Some(targets),
            dry_run: self.dry_run,
        };
        if !self.persist(&decision).await {
            self.safety.release_slot();
            return;
        }
        self.learner.record_decision(trace_id, features);
        match self.client.submit(&decision, None).await {
            Ok(ExecutionAck::Accepted { order_id }) => {
                info!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    %trace_id,
                    order_id,
                    %side,
                    size,
                    entry = features.close,
                    tp = targets.take_profit,
                    sl = targets.stop_loss,
                    "position opened"
                );
                self.position = Some(Position {
                    symbol: self.symbol.clone(),
                    side,
                    size,
                    entry_price: features.close,
                    opened_at: features.timestamp,
                    take_profit: targets.take_profit,
                    stop_loss: targets.stop_loss,
                    net_profit_threshold: targets.net_profit_threshold,
                    strategy: proposal.strategy.clone(),
                    model_version,
                    opened_by: trace_id,
                });
            }
            Ok(ExecutionAck::Rejected { reason }) => {
                warn!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, reason, "entry rejected");
                self.learner.abandon(trace_id);
                self.safety.release_slot();
                self.notifier
                    .notify(Severity::Warning, &self.symbol, &format!("entry rejected: {reason}"))
                    .await;
            }
            Err(err) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, %err, "entry submit failed");
                self.learner.abandon(trace_id);
                self.safety.release_slot();
                self.notifier
                    .notify(Severity::Critical, &self.symbol, &format!("submit failed: {err}"))
                    .await;
            }
        }
    }

    async fn handle_exit(
        &mut self,
        trace_id: TraceId,
        features: &FeatureVector,
        proposal: &ProposedAction,
        reason: String,
        confidence: f64,
        model_version: Option<VersionId>,
    ) {
        let decision = Decision {
            trace_id,
            symbol: self.symbol.clone(),
            timestamp: features.timestamp,
            action: DecisionAction::Exit {
                reason: reason.clone(),
            },
            confidence,
            strategy: Some(proposal.strategy.clone()),
            model_version,
            reference_price: features.close,
            targets: None,
            dry_run: self.dry_run,
        };
        if !self.persist(&decision).await {
            return;
        }
        self.learner.record_decision(trace_id, features);
        match self.client.submit(&decision, self.position.as_ref()).await {
            Ok(ExecutionAck::Accepted { .. }) => {
                info!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, reason, "exit accepted");
                self.pending_close = true;
            }
            Ok(ExecutionAck::Rejected { reason }) => {
                warn!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, reason, "exit rejected");
                self.learner.abandon(trace_id);
                self.notifier
                    .notify(Severity::Critical, &self.symbol, &format!("exit rejected: {reason}"))
                    .await;
            }
            Err(err) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, %err, "exit submit failed");
                self.learner.abandon(trace_id);
                self.notifier
                    .notify(Severity::Critical, &self.symbol, &format!("submit failed: {err}"))
                    .await;
            }
        }
    }

    async fn handle_adjust(
        &mut self,
        trace_id: TraceId,
        features: &FeatureVector,
        proposal: &ProposedAction,
        stop_loss: f64,
        confidence: f64,
        model_version: Option<VersionId>,
    ) {
        let decision = Decision {
            trace_id,
            symbol: self.symbol.clone(),
            timestamp: features.timestamp,
            action: DecisionAction::Adjust { stop_loss },
            confidence,
            strategy: Some(proposal.strategy.clone()),
            model_version,
            reference_price: features.close,
            targets: None,
            dry_run: self.dry_run,
        };
        if !self.persist(&decision).await {
            return;
        }
        // Adjustments produce no fill, so no learner slot is claimed.
        match self.client.submit(&decision, self.position.as_ref()).await {
            Ok(ExecutionAck::Accepted { .. }) => {
                if let Some(position) = self.position.as_mut() {
                    info!(
                        target: "arbiter.engine",
                        symbol = %self.symbol,
                        %trace_id,
                        from = position.stop_loss,
                        to = stop_loss,
                        "stop adjusted"
                    );
                    position.stop_loss = stop_loss;
                }
            }
            Ok(ExecutionAck::Rejected { reason }) => {
                warn!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, reason, "adjust rejected");
            }
            Err(err) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %trace_id, %err, "adjust submit failed");
            }
        }
    }

    /// Emits the cycle's hold decision. Holds are persisted like any
    /// other decision but never handed to execution.
    async fn emit_hold(
        &mut self,
        trace_id: TraceId,
        price: f64,
        timestamp: DateTime<Utc>,
        model_version: Option<VersionId>,
    ) {
        let decision = Decision {
            trace_id,
            symbol: self.symbol.clone(),
            timestamp,
            action: DecisionAction::Hold,
            confidence: 0.0,
            strategy: None,
            model_version,
            reference_price: price,
            targets: None,
            dry_run: self.dry_run,
        };
        self.persist(&decision).await;
    }

    /// Persists a decision ahead of any execution hand-off. Returns false
    /// (and alerts) when persistence failed; the decision must then not
    /// be dispatched.
    async fn persist(&self, decision: &Decision) -> bool {
        match self.store.record_decision(decision) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    trace_id = %decision.trace_id,
                    %err,
                    "decision persistence failed, withholding dispatch"
                );
                self.notifier
                    .notify(
                        Severity::Critical,
                        &self.symbol,
                        &format!("decision persistence failed: {err}"),
                    )
                    .await;
                false
            }
        }
    }

    async fn on_feedback(&mut self, feedback: FillFeedback) {
        if let Err(err) = self.store.record_feedback(&feedback) {
            warn!(target: "arbiter.engine", %err, "feedback persistence failed");
        }
        match self.learner.ingest(feedback.clone()) {
            Ok(applied) => {
                debug!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    trace_id = %feedback.trace_id,
                    applied,
                    "feedback ingested"
                );
            }
            Err(LearnerError::OrphanFeedback(trace_id)) => {
                warn!(
                    target: "arbiter.engine",
                    symbol = %self.symbol,
                    %trace_id,
                    orphans = self.learner.stats().orphans,
                    "orphan feedback dropped"
                );
                return;
            }
            Err(err) => {
                error!(target: "arbiter.engine", symbol = %self.symbol, %err, "feedback ingest failed");
                return;
            }
        }

        if feedback.closed {
            if let Some(position) = self.position.take() {
                // The entry's feedback slot cannot fill once the position
                // is gone; release it so the ordered drain moves on.
                self.learner.abandon(position.opened_by);
                self.safety.release_slot();
                self.pending_close = false;
                self.last_exit_at = Some(feedback.timestamp);
                if let Some(net) = feedback.realized_pnl_net {
                    self.safety.record_close(net, feedback.timestamp);
                    info!(
                        target: "arbiter.engine",
                        symbol = %self.symbol,
                        trace_id = %feedback.trace_id,
                        strategy = %position.strategy,
                        net,
                        "position closed"
                    );
                    if let Some(reason) = self.safety.entries_paused(feedback.timestamp) {
                        self.notifier
                            .notify(
                                Severity::Warning,
                                &self.symbol,
                                &format!("entries paused: {reason}"),
                            )
                            .await;
                    }
                }
            }
        } else if let Some(position) = self.position.as_mut() {
            // Entry confirmation: true to the venue's fill price.
            if position.opened_by == feedback.trace_id {
                position.entry_price = feedback.fill_price;
            }
        }
    }
}
