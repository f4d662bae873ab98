//! Deterministic simulated execution.

use arbiter_core::{
    Decision, DecisionAction, ExecutionAck, FillFeedback, Position,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{BrokerError, BrokerResult, ExecutionClient};

/// Fills every accepted decision immediately at its reference price and
/// charges the configured per-leg fee. No slippage, no latency, no
/// randomness: the same decision stream always produces the same feedback
/// stream, which is what dry-run parity and replay depend on.
pub struct PaperExecutionClient {
    fee_rate: f64,
    feedback: mpsc::Sender<FillFeedback>,
}

impl PaperExecutionClient {
    pub fn new(fee_rate: f64, feedback: mpsc::Sender<FillFeedback>) -> Self {
        Self { fee_rate, feedback }
    }

    async fn emit(&self, feedback: FillFeedback) -> BrokerResult<()> {
        self.feedback
            .send(feedback)
            .await
            .map_err(|err| BrokerError::Transport(format!("feedback channel closed: {err}")))
    }
}

#[async_trait]
impl ExecutionClient for PaperExecutionClient {
    fn name(&self) -> &str {
        "paper"
    }

    async fn submit(
        &self,
        decision: &Decision,
        position: Option<&Position>,
    ) -> BrokerResult<ExecutionAck> {
        let price = decision.reference_price;
        match &decision.action {
            DecisionAction::Enter { side, size } => {
                if !size.is_finite() || *size <= 0.0 {
                    warn!(
                        target: "arbiter.paper",
                        trace_id = %decision.trace_id,
                        size,
                        "rejecting entry with unusable size"
                    );
                    return Ok(ExecutionAck::Rejected {
                        reason: format!("unusable size: {size}"),
                    });
                }
                let fee = price * size * self.fee_rate;
                self.emit(FillFeedback {
                    trace_id: decision.trace_id,
                    symbol: decision.symbol.clone(),
                    side: *side,
                    fill_price: price,
                    size: *size,
                    fee_paid: fee,
                    closed: false,
                    realized_pnl_net: None,
                    // Fills inherit the decision clock so replays and
                    // dry-run comparisons stay deterministic.
                    timestamp: decision.timestamp,
                })
                .await?;
                Ok(ExecutionAck::Accepted {
                    order_id: Uuid::new_v4().to_string(),
                })
            }
            DecisionAction::Exit { reason } => {
                let Some(position) = position else {
                    return Ok(ExecutionAck::Rejected {
                        reason: "exit without open position".into(),
                    });
                };
                let gross = position.gross_pnl(price);
                let entry_fee = position.entry_price * position.size * self.fee_rate;
                let exit_fee = price * position.size * self.fee_rate;
                let net = gross - entry_fee - exit_fee;
                debug!(
                    target: "arbiter.paper",
                    trace_id = %decision.trace_id,
                    reason,
                    gross,
                    net,
                    "settling exit"
                );
                self.emit(FillFeedback {
                    trace_id: decision.trace_id,
                    symbol: decision.symbol.clone(),
                    side: position.side.inverse(),
                    fill_price: price,
                    size: position.size,
                    fee_paid: exit_fee,
                    closed: true,
                    realized_pnl_net: Some(net),
                    timestamp: decision.timestamp,
                })
                .await?;
                Ok(ExecutionAck::Accepted {
                    order_id: Uuid::new_v4().to_string(),
                })
            }
            // Stop adjustments settle instantly and produce no fill.
            DecisionAction::Adjust { .. } | DecisionAction::Hold => Ok(ExecutionAck::Accepted {
                order_id: Uuid::new_v4().to_string(),
            }),
        }
    }
}
