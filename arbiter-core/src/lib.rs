//! Core domain types shared across the arbiter workspace.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Price level expressed in quote currency.
pub type Price = f64;
/// Quantity expressed in base currency.
pub type Quantity = f64;
/// Instrument identifier, e.g. `BTCUSDT`.
pub type Symbol = String;

/// Training provenance of a model artifact. `Online` artifacts start from
/// a seed and evolve with live feedback; `Offline` ones come out of batch
/// training over the persisted corpus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLineage {
    Online,
    Offline,
}

impl fmt::Display for ModelLineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Correlation id minted once per decision cycle and carried through
/// persistence, execution, and feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(pub Uuid);

impl TraceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of a registered model artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub Uuid);

impl VersionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Direction of an exposure or order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Sign convention used by P&L math: long +1, short -1.
    #[must_use]
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A single OHLCV bar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    /// True range against the previous close, the ATR building block.
    #[must_use]
    pub fn true_range(&self, prev_close: Price) -> Price {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Names of the fixed feature schema, index-aligned with
/// [`FeatureVector::values`]. Model weights are stored in this order.
pub const FEATURE_NAMES: [&str; 9] = [
    "ret_1",
    "momentum",
    "ma_ratio",
    "volatility",
    "volume_ratio",
    "rsi",
    "band_position",
    "win_rate",
    "fee_drag",
];

/// Number of slots in the feature schema.
pub const FEATURE_DIM: usize = FEATURE_NAMES.len();

/// Snapshot of market state and recent execution quality for one symbol,
/// computed once per decision cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    /// One-candle log-free return of the close.
    pub ret_1: f64,
    /// Close relative to the fast moving average.
    pub momentum: f64,
    /// Fast moving average over slow moving average.
    pub ma_ratio: f64,
    /// ATR normalized by the close.
    pub volatility: f64,
    /// Last volume over the average volume of the window.
    pub volume_ratio: f64,
    /// Relative strength index in [0, 100].
    pub rsi: f64,
    /// Close position within the Bollinger band, 0 at the lower band.
    pub band_position: f64,
    /// Win rate over the trader's recent closed fills.
    pub win_rate: f64,
    /// Fees paid over gross notional across recent fills.
    pub fee_drag: f64,
    /// Average true range in price units.
    pub atr: Price,
    /// Close of the latest candle, the cycle's reference price.
    pub close: Price,
}

impl FeatureVector {
    /// Model input in [`FEATURE_NAMES`] order.
    #[must_use]
    pub fn values(&self) -> [f64; FEATURE_DIM] {
        [
            self.ret_1,
            self.momentum,
            self.ma_ratio,
            self.volatility,
            self.volume_ratio,
            self.rsi,
            self.band_position,
            self.win_rate,
            self.fee_drag,
        ]
    }
}

/// Market regime label produced by the regime filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendUp,
    TrendDown,
    Range,
    HighVolatility,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TrendUp => "trend_up",
            Self::TrendDown => "trend_down",
            Self::Range => "range",
            Self::HighVolatility => "high_volatility",
        };
        write!(f, "{label}")
    }
}

/// Exit levels and the fee-aware profitability floor for one prospective
/// entry. All profit decisions must clear `net_profit_threshold` first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskTargets {
    pub take_profit: Price,
    pub stop_loss: Price,
    /// Round-trip fee cost per unit at the entry price. Gross moves below
    /// this are losses once fees settle.
    pub net_profit_threshold: Price,
}

/// What a strategy variant wants to do, before model scoring and conflict
/// resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Name of the proposing strategy variant.
    pub strategy: String,
    pub action: DecisionAction,
    /// Variant-local conviction in [0, 1].
    pub confidence: f64,
    /// Short human-readable cause, e.g. `rsi_oversold_band_touch`.
    pub reason: String,
}

/// The action component of a [`Decision`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionAction {
    Enter { side: Side, size: Quantity },
    Exit { reason: String },
    /// Move the protective stop of the open position.
    Adjust { stop_loss: Price },
    Hold,
}

impl DecisionAction {
    #[must_use]
    pub fn is_hold(&self) -> bool {
        matches!(self, Self::Hold)
    }

    /// Label used in logs and persistence.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Enter { .. } => "enter",
            Self::Exit { .. } => "exit",
            Self::Adjust { .. } => "adjust",
            Self::Hold => "hold",
        }
    }
}

/// The single artifact a decision cycle emits. Persisted before any
/// execution hand-off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub trace_id: TraceId,
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub action: DecisionAction,
    /// Final confidence after model adjustment.
    pub confidence: f64,
    /// Strategy variant that won selection, absent on pure holds.
    pub strategy: Option<String>,
    /// Model version consulted for scoring, absent when the registry was
    /// skipped or unavailable.
    pub model_version: Option<VersionId>,
    /// Reference price the cycle acted on (latest close).
    pub reference_price: Price,
    /// Risk targets attached to entries.
    pub targets: Option<RiskTargets>,
    /// True when the engine ran with simulated execution. Stamped on every
    /// record so audits can tell paper tape from live tape.
    pub dry_run: bool,
}

/// An open exposure. The engine maintains at most one per symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub size: Quantity,
    pub entry_price: Price,
    pub opened_at: DateTime<Utc>,
    pub take_profit: Price,
    /// Mutable: breakeven protection tightens it via `Adjust`.
    pub stop_loss: Price,
    /// Fee floor captured at entry, used for net P&L gating.
    pub net_profit_threshold: Price,
    pub strategy: String,
    pub model_version: Option<VersionId>,
    /// Trace of the decision that opened this position.
    pub opened_by: TraceId,
}

impl Position {
    /// Gross P&L at a mark price, before fees.
    #[must_use]
    pub fn gross_pnl(&self, mark: Price) -> f64 {
        (mark - self.entry_price) * self.size * f64::from(self.side.as_i8())
    }
}

/// Terminal or partial execution report correlated back to a decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillFeedback {
    pub trace_id: TraceId,
    pub symbol: Symbol,
    pub side: Side,
    pub fill_price: Price,
    pub size: Quantity,
    pub fee_paid: Price,
    /// True when this fill closed the position.
    pub closed: bool,
    /// Realized P&L net of all fees, present on closing fills.
    pub realized_pnl_net: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous acknowledgement from the execution collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionAck {
    Accepted { order_id: String },
    Rejected { reason: String },
}

/// Lifecycle state of a model artifact within the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Candidate,
    Active,
    Retired,
}

/// A versioned, immutable scoring model. Weights are aligned with
/// [`FEATURE_NAMES`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: VersionId,
    pub lineage: ModelLineage,
    pub created_at: DateTime<Utc>,
    pub feature_dim: usize,
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Number of labeled samples behind the fit, zero for seed models.
    pub trained_samples: usize,
    pub status: ModelStatus,
    /// Offline evaluation metrics keyed by name.
    pub metrics: BTreeMap<String, f64>,
}

impl ModelArtifact {
    /// A neutral artifact scoring every input at zero, used to bootstrap a
    /// symbol's online model before any training has happened.
    #[must_use]
    pub fn seed() -> Self {
        Self {
            version: VersionId::new(),
            lineage: ModelLineage::Online,
            created_at: Utc::now(),
            feature_dim: FEATURE_DIM,
            weights: vec![0.0; FEATURE_DIM],
            bias: 0.0,
            trained_samples: 0,
            status: ModelStatus::Candidate,
            metrics: BTreeMap::new(),
        }
    }
}
