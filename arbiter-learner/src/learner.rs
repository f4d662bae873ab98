//! Per-symbol online learner with ordered feedback application.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use arbiter_core::{FeatureVector, FillFeedback, ModelArtifact, TraceId, FEATURE_DIM};
use tracing::{debug, warn};

use crate::model::OnlineModel;
use crate::{LearnerError, LearnerResult};

#[derive(Clone, Copy, Debug)]
struct PendingDecision {
    seq: u64,
    features: [f64; FEATURE_DIM],
}

/// Aggregate counters exposed for features and monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct LearnerStats {
    pub applied: u64,
    pub orphans: u64,
    /// Win rate over the recent-outcome window, 0.5 with no history.
    pub win_rate: f64,
    /// Fees over gross notional across recorded fills.
    pub fee_drag: f64,
}

/// Applies execution feedback to an [`OnlineModel`] strictly in the order
/// decisions were emitted for the symbol.
///
/// Feedback can arrive out of order (venue latency, partial-fill timing);
/// it is buffered by emission sequence and drained only when contiguous,
/// so the final model state is a function of the decision sequence alone,
/// never of arrival timing. A decision may receive many fills: partials
/// accumulate into the fee/notional counters while the slot stays
/// claimed, and only the closing fill parks the slot for the ordered
/// drain. Decisions that will never produce a closing fill (execution
/// rejected them, or the position they opened was closed by a later
/// decision) must be released with [`abandon`] or they would stall the
/// drain.
///
/// [`abandon`]: OnlineLearner::abandon
pub struct OnlineLearner {
    model: Arc<OnlineModel>,
    /// trace -> pending slot, claimed at emission time.
    emitted: HashMap<TraceId, PendingDecision>,
    /// Feedback parked until its slot is next in line.
    parked: BTreeMap<u64, (PendingDecision, FillFeedback)>,
    /// Slots released without feedback.
    abandoned: BTreeSet<u64>,
    next_emit: u64,
    next_apply: u64,
    recent_outcomes: VecDeque<f64>,
    recent_window: usize,
    fees_paid: f64,
    gross_notional: f64,
    applied: u64,
    orphans: u64,
}

impl OnlineLearner {
    pub fn new(artifact: &ModelArtifact, learning_rate: f64, recent_window: usize) -> LearnerResult<Self> {
        Ok(Self {
            model: Arc::new(OnlineModel::from_artifact(artifact, learning_rate)?),
            emitted: HashMap::new(),
            parked: BTreeMap::new(),
            abandoned: BTreeSet::new(),
            next_emit: 0,
            next_apply: 0,
            recent_outcomes: VecDeque::with_capacity(recent_window),
            recent_window: recent_window.max(1),
            fees_paid: 0.0,
            gross_notional: 0.0,
            applied: 0,
            orphans: 0,
        })
    }

    /// Shared scoring handle, safe to use concurrently with updates.
    #[must_use]
    pub fn model(&self) -> Arc<OnlineModel> {
        Arc::clone(&self.model)
    }

    /// Rebinds the learner to a newly promoted artifact. Sequencing state
    /// survives the swap; in-flight feedback updates the new model.
    pub fn replace_model(&mut self, artifact: &ModelArtifact, learning_rate: f64) -> LearnerResult<()> {
        self.model = Arc::new(OnlineModel::from_artifact(artifact, learning_rate)?);
        Ok(())
    }

    /// Claims the next emission slot for a dispatched decision. Must be
    /// called in the exact order decisions are emitted for the symbol.
    pub fn record_decision(&mut self, trace_id: TraceId, features: &FeatureVector) -> u64 {
        let seq = self.next_emit;
        self.next_emit += 1;
        self.emitted.insert(
            trace_id,
            PendingDecision {
                seq,
                features: features.values(),
            },
        );
        seq
    }

    /// Releases the slot of a decision execution rejected. Idempotent for
    /// unknown traces.
    pub fn abandon(&mut self, trace_id: TraceId) {
        if let Some(pending) = self.emitted.remove(&trace_id) {
            self.abandoned.insert(pending.seq);
            self.drain();
        }
    }

    /// Buffers feedback and applies every slot that became contiguous.
    /// Returns the number of updates applied by this call. Non-closing
    /// fills feed the fee/notional counters and leave the slot claimed
    /// for the fills still to come.
    pub fn ingest(&mut self, feedback: FillFeedback) -> LearnerResult<usize> {
        let Some(pending) = self.emitted.get(&feedback.trace_id).copied() else {
            self.orphans += 1;
            return Err(LearnerError::OrphanFeedback(feedback.trace_id));
        };
        self.fees_paid += feedback.fee_paid;
        self.gross_notional += feedback.fill_price * feedback.size;
        if !feedback.closed {
            return Ok(0);
        }
        self.emitted.remove(&feedback.trace_id);
        self.parked.insert(pending.seq, (pending, feedback));
        Ok(self.drain())
    }

    fn drain(&mut self) -> usize {
        let mut drained = 0;
        loop {
            if self.abandoned.remove(&self.next_apply) {
                self.next_apply += 1;
                continue;
            }
            let Some((pending, feedback)) = self.parked.remove(&self.next_apply) else {
                break;
            };
            self.apply(&pending, &feedback);
            self.next_apply += 1;
            drained += 1;
        }
        drained
    }

    fn apply(&mut self, pending: &PendingDecision, feedback: &FillFeedback) {
        if let Some(net) = feedback.realized_pnl_net {
            if self.recent_outcomes.len() == self.recent_window {
                self.recent_outcomes.pop_front();
            }
            self.recent_outcomes.push_back(net);
            let label = crate::outcome_label(net, feedback.fill_price * feedback.size);
            self.model.apply(&pending.features, label);
            self.applied += 1;
            debug!(
                target: "arbiter.learner",
                trace_id = %feedback.trace_id,
                seq = pending.seq,
                net,
                "applied closing feedback"
            );
        } else {
            self.applied += 1;
        }
        if !self.parked.is_empty() && self.parked.len() % 32 == 0 {
            warn!(
                target: "arbiter.learner",
                parked = self.parked.len(),
                "feedback reorder buffer growing"
            );
        }
    }

    #[must_use]
    pub fn stats(&self) -> LearnerStats {
        let win_rate = if self.recent_outcomes.is_empty() {
            0.5
        } else {
            let wins = self.recent_outcomes.iter().filter(|p| **p > 0.0).count();
            wins as f64 / self.recent_outcomes.len() as f64
        };
        let fee_drag = if self.gross_notional > f64::EPSILON {
            self.fees_paid / self.gross_notional
        } else {
            0.0
        };
        LearnerStats {
            applied: self.applied,
            orphans: self.orphans,
            win_rate,
            fee_drag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Side;
    use chrono::Utc;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn features(ret: f64) -> FeatureVector {
        FeatureVector {
            symbol: "BTCUSDT".into(),
            timestamp: Utc::now(),
            ret_1: ret,
            momentum: ret * 0.5,
            ma_ratio: 1.0 + ret,
            volatility: 0.01,
            volume_ratio: 1.3,
            rsi: 50.0,
            band_position: 0.5,
            win_rate: 0.5,
            fee_drag: 0.0,
            atr: 2.0,
            close: 100.0,
        }
    }

    fn feedback(trace_id: TraceId, net: f64) -> FillFeedback {
        FillFeedback {
            trace_id,
            symbol: "BTCUSDT".into(),
            side: Side::Sell,
            fill_price: 100.0,
            size: 1.0,
            fee_paid: 0.1,
            closed: true,
            realized_pnl_net: Some(net),
            timestamp: Utc::now(),
        }
    }

    fn learner() -> OnlineLearner {
        OnlineLearner::new(&ModelArtifact::seed(), 0.05, 50).unwrap()
    }

    #[test]
    fn orphan_feedback_is_counted_not_fatal() {
        let mut l = learner();
        let err = l.ingest(feedback(TraceId::new(), 1.0)).unwrap_err();
        assert!(matches!(err, LearnerError::OrphanFeedback(_)));
        assert_eq!(l.stats().orphans, 1);
        // The learner still works afterwards.
        let trace = TraceId::new();
        l.record_decision(trace, &features(0.01));
        assert_eq!(l.ingest(feedback(trace, 0.5)).unwrap(), 1);
    }

    #[test]
    fn out_of_order_feedback_waits_for_its_turn() {
        let mut l = learner();
        let t0 = TraceId::new();
        let t1 = TraceId::new();
        l.record_decision(t0, &features(0.01));
        l.record_decision(t1, &features(-0.02));
        // Later decision's feedback arrives first: nothing applies yet.
        assert_eq!(l.ingest(feedback(t1, -0.4)).unwrap(), 0);
        // The missing slot arrives and both drain in emission order.
        assert_eq!(l.ingest(feedback(t0, 0.6)).unwrap(), 2);
        assert_eq!(l.stats().applied, 2);
    }

    #[test]
    fn abandoned_slots_unblock_the_queue() {
        let mut l = learner();
        let rejected = TraceId::new();
        let filled = TraceId::new();
        l.record_decision(rejected, &features(0.01));
        l.record_decision(filled, &features(0.02));
        assert_eq!(l.ingest(feedback(filled, 0.3)).unwrap(), 0);
        l.abandon(rejected);
        assert_eq!(l.stats().applied, 1);
    }

    #[test]
    fn partial_fills_keep_the_slot_until_close() {
        let mut l = learner();
        let trace = TraceId::new();
        l.record_decision(trace, &features(0.01));
        let mut partial = feedback(trace, 0.0);
        partial.closed = false;
        partial.realized_pnl_net = None;
        partial.size = 0.4;
        assert_eq!(l.ingest(partial).unwrap(), 0);
        // The later fill for the same decision is not an orphan.
        let mut closing = feedback(trace, 0.6);
        closing.size = 0.6;
        assert_eq!(l.ingest(closing).unwrap(), 1);
        let stats = l.stats();
        assert_eq!(stats.orphans, 0);
        assert_eq!(stats.applied, 1);
        // Both legs count toward the fee counters.
        assert!((stats.fee_drag - 0.2 / 100.0).abs() < 1e-12);
    }

    #[test]
    fn open_entry_slot_blocks_later_updates_until_released() {
        let mut l = learner();
        let entry = TraceId::new();
        let exit = TraceId::new();
        l.record_decision(entry, &features(0.01));
        l.record_decision(exit, &features(0.02));
        let mut fill = feedback(entry, 0.0);
        fill.closed = false;
        fill.realized_pnl_net = None;
        assert_eq!(l.ingest(fill).unwrap(), 0);
        // The exit's closing fill parks behind the still-open entry slot.
        assert_eq!(l.ingest(feedback(exit, 0.5)).unwrap(), 0);
        l.abandon(entry);
        assert_eq!(l.stats().applied, 1);
    }

    // Shuffled arrival with correct emission sequencing must land on the
    // same model state as in-order arrival.
    #[test]
    fn final_state_is_invariant_to_arrival_order() {
        let outcomes: Vec<f64> = (0..12)
            .map(|i| if i % 3 == 0 { -0.5 } else { 0.4 + i as f64 * 0.05 })
            .collect();

        let run = |order: &[usize]| {
            let mut l = learner();
            let traces: Vec<TraceId> = (0..outcomes.len()).map(|_| TraceId::new()).collect();
            for (i, trace) in traces.iter().enumerate() {
                l.record_decision(*trace, &features(0.01 * i as f64));
            }
            for &i in order {
                let _ = l.ingest(feedback(traces[i], outcomes[i]));
            }
            l.model().snapshot().weights
        };

        let in_order: Vec<usize> = (0..outcomes.len()).collect();
        let mut shuffled = in_order.clone();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        shuffled.shuffle(&mut rng);
        assert_ne!(in_order, shuffled);

        assert_eq!(run(&in_order), run(&shuffled));
    }

    #[test]
    fn win_rate_tracks_recent_outcomes() {
        let mut l = learner();
        for net in [1.0, 1.0, -1.0, 1.0] {
            let trace = TraceId::new();
            l.record_decision(trace, &features(0.0));
            l.ingest(feedback(trace, net)).unwrap();
        }
        assert!((l.stats().win_rate - 0.75).abs() < 1e-12);
        assert!(l.stats().fee_drag > 0.0);
    }
}
