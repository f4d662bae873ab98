//! Layered configuration loading utilities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use arbiter_core::Regime;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Root application configuration deserialized from layered sources.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When true the engine talks to the simulated execution client. This
    /// is the default: live trading must be opted into explicitly.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: default_dry_run(),
            symbols: default_symbols(),
            store_path: default_store_path(),
            features: FeatureConfig::default(),
            risk: RiskConfig::default(),
            strategy: StrategyConfig::default(),
            learner: LearnerConfig::default(),
            registry: RegistryConfig::default(),
            alerting: AlertingConfig::default(),
        }
    }
}

/// Indicator windows feeding the feature builder and regime filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default = "default_atr_window")]
    pub atr_window: usize,
    #[serde(default)]
    pub atr_smoothing: AtrSmoothing,
    #[serde(default = "default_ma_fast")]
    pub ma_fast: usize,
    #[serde(default = "default_ma_slow")]
    pub ma_slow: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_band_period")]
    pub band_period: usize,
    #[serde(default = "default_band_sigma")]
    pub band_sigma: f64,
    /// Volatility-to-price ratio above which the regime is flagged
    /// high-volatility regardless of trend.
    #[serde(default = "default_high_vol_ratio")]
    pub high_volatility_ratio: f64,
    /// Minimum MA separation before a market counts as trending.
    #[serde(default = "default_trend_band")]
    pub trend_band: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            atr_window: default_atr_window(),
            atr_smoothing: AtrSmoothing::default(),
            ma_fast: default_ma_fast(),
            ma_slow: default_ma_slow(),
            rsi_period: default_rsi_period(),
            band_period: default_band_period(),
            band_sigma: default_band_sigma(),
            high_volatility_ratio: default_high_vol_ratio(),
            trend_band: default_trend_band(),
        }
    }
}

impl FeatureConfig {
    /// Candles required before the builder can emit a full vector.
    #[must_use]
    pub fn min_history(&self) -> usize {
        self.ma_slow
            .max(self.band_period)
            .max(self.rsi_period + 1)
            .max(self.atr_window + 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AtrSmoothing {
    Sma,
    #[default]
    Ema,
}

/// Sizing, fee, and safety limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    #[serde(default = "default_tp_multiplier")]
    pub tp_multiplier: f64,
    #[serde(default = "default_sl_multiplier")]
    pub sl_multiplier: f64,
    /// Per-leg taker fee as a fraction of notional.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    /// Base position size in base currency; scaled by confidence.
    #[serde(default = "default_base_size")]
    pub base_size: f64,
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Equity base the daily loss limit is measured against.
    #[serde(default = "default_reference_equity")]
    pub reference_equity: f64,
    /// Fraction of `reference_equity` lost in a day that pauses new
    /// entries.
    #[serde(default = "default_daily_max_loss_pct")]
    pub daily_max_loss_pct: f64,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// Seconds to wait after an exit before re-entering the same symbol.
    #[serde(default = "default_reentry_cooldown_secs")]
    pub reentry_cooldown_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tp_multiplier: default_tp_multiplier(),
            sl_multiplier: default_sl_multiplier(),
            fee_rate: default_fee_rate(),
            base_size: default_base_size(),
            max_open_positions: default_max_open_positions(),
            reference_equity: default_reference_equity(),
            daily_max_loss_pct: default_daily_max_loss_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            reentry_cooldown_secs: default_reentry_cooldown_secs(),
        }
    }
}

/// How competing strategy proposals are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    #[default]
    Priority,
    Confidence,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Variant names in descending priority.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Regimes each variant may open positions in. Variants absent from
    /// the map are never eligible.
    #[serde(default = "default_allowed_regimes")]
    pub allowed_regimes: HashMap<String, Vec<Regime>>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            conflict_resolution: ConflictResolution::default(),
            allowed_regimes: default_allowed_regimes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LearnerConfig {
    /// Budget for one model scoring call; timeouts score neutral.
    #[serde(default = "default_online_update_deadline_ms")]
    pub online_update_deadline_ms: u64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Closed-trade window backing the win-rate memory.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            online_update_deadline_ms: default_online_update_deadline_ms(),
            learning_rate: default_learning_rate(),
            recent_window: default_recent_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Traffic share given to the newest journaled offline candidate when
    /// the engine installs it at startup. Zero disables the install.
    #[serde(default = "default_traffic_split")]
    pub traffic_split_default: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            traffic_split_default: default_traffic_split(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertingConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dry_run() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/arbiter.db")
}

fn default_atr_window() -> usize {
    14
}

fn default_ma_fast() -> usize {
    5
}

fn default_ma_slow() -> usize {
    20
}

fn default_rsi_period() -> usize {
    14
}

fn default_band_period() -> usize {
    20
}

fn default_band_sigma() -> f64 {
    2.5
}

fn default_high_vol_ratio() -> f64 {
    0.03
}

fn default_trend_band() -> f64 {
    0.002
}

fn default_tp_multiplier() -> f64 {
    3.0
}

fn default_sl_multiplier() -> f64 {
    1.5
}

fn default_fee_rate() -> f64 {
    0.001
}

fn default_base_size() -> f64 {
    1.0
}

fn default_max_open_positions() -> usize {
    3
}

fn default_reference_equity() -> f64 {
    10_000.0
}

fn default_daily_max_loss_pct() -> f64 {
    0.02
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_reentry_cooldown_secs() -> u64 {
    300
}

fn default_priority() -> Vec<String> {
    vec![
        "trend_follow".to_string(),
        "breakout".to_string(),
        "reversal".to_string(),
    ]
}

fn default_allowed_regimes() -> HashMap<String, Vec<Regime>> {
    let mut map = HashMap::new();
    map.insert(
        "trend_follow".to_string(),
        vec![Regime::TrendUp, Regime::TrendDown],
    );
    map.insert(
        "breakout".to_string(),
        vec![Regime::TrendUp, Regime::Range],
    );
    map.insert("reversal".to_string(), vec![Regime::Range]);
    map
}

fn default_online_update_deadline_ms() -> u64 {
    50
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_recent_window() -> usize {
    50
}

fn default_traffic_split() -> f64 {
    0.1
}

/// Loads configuration by merging files and environment variables.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `ARBITER_`
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    let base_path = Path::new("config");

    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(true));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("ARBITER")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder.build()?;
    config
        .try_deserialize()
        .map_err(|err: ConfigError| err.into())
}
