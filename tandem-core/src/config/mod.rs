//! Runtime configuration
//!
//! A single structured JSON document configures the process: queue keys
//! and capacities, the two instruments, the model parameters (thresholds
//! plus risk caps), cost rates, control listen address, and snapshot
//! path. A legacy two-file pair — control document plus model document —
//! is accepted and merged; `reload-thresholds` re-reads only the model
//! document.
//!
//! None of this is hot path: everything is loaded once at start and on
//! explicit reload commands.

use crate::book::InstrumentSpec;
use crate::risk::RiskLimits;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Spread-deviation thresholds and quoting parameters (model file)
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ThresholdSet {
    pub begin_place: f64,
    pub long_place: f64,
    pub short_place: f64,
    pub begin_remove: f64,
    pub long_remove: f64,
    pub short_remove: f64,
    /// Per-order quantity (lots).
    pub size: u32,
    /// Absolute position cap (lots).
    pub max_size: i64,
    /// EMA smoothing factor for the spread mean.
    pub alpha: f64,
    /// Ticks of aggression for the hedger's final escalation step.
    pub slop: u32,
    /// Trailing window length for the spread standard deviation.
    #[serde(default = "default_spread_window")]
    pub avg_spread_away: usize,
    /// Step passive quotes one tick inside the touch.
    #[serde(default)]
    pub improve: bool,
}

fn default_spread_window() -> usize {
    60
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            begin_place: 2.0,
            long_place: 3.5,
            short_place: 0.5,
            begin_remove: 1.0,
            long_remove: 2.0,
            short_remove: 0.2,
            size: 1,
            max_size: 100,
            alpha: 0.05,
            slop: 5,
            avg_spread_away: 60,
            improve: false,
        }
    }
}

/// Model document: thresholds, risk caps, ratio, cost rates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub thresholds: ThresholdSet,
    #[serde(default)]
    pub risk: RiskLimits,
    /// Hedge ratio in the spread `mid1 - ratio * mid2`.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    /// Exchange cost rate per lot, passive leg.
    #[serde(default)]
    pub leg1_fee_per_lot: f64,
    /// Exchange cost rate per lot, hedge leg.
    #[serde(default)]
    pub leg2_fee_per_lot: f64,
}

fn default_ratio() -> f64 {
    1.0
}

/// Shared-memory keys and queue capacities
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    pub md_key: u32,
    pub request_key: u32,
    pub response_key: u32,
    pub client_store_key: u32,
    /// Key of the externally written t-var cell; absent means the
    /// strategy runs with a zero offset.
    #[serde(default)]
    pub tvar_key: Option<u32>,
    #[serde(default = "default_md_capacity")]
    pub md_capacity: u32,
    #[serde(default = "default_request_capacity")]
    pub request_capacity: u32,
    #[serde(default = "default_md_capacity")]
    pub response_capacity: u32,
    /// Process-local staging buffer in front of the request ring.
    #[serde(default = "default_stage_capacity")]
    pub stage_capacity: usize,
    /// Bounded retry budget before a send surfaces QUEUE_FULL.
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
}

fn default_md_capacity() -> u32 {
    65_536
}

fn default_request_capacity() -> u32 {
    8_192
}

fn default_stage_capacity() -> usize {
    1_024
}

fn default_send_retries() -> u32 {
    64
}

/// Control-plane listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8710".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Full process configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub strategy_id: i32,
    pub account: String,
    pub ipc: IpcConfig,
    #[serde(default)]
    pub control: ControlConfig,
    pub snapshot_path: PathBuf,
    /// Passive (quoted) leg.
    pub leg1: InstrumentSpec,
    /// Hedge leg.
    pub leg2: InstrumentSpec,
    pub model: ModelConfig,
    #[serde(default = "default_max_open_orders")]
    pub max_open_orders: usize,
}

fn default_max_open_orders() -> usize {
    16
}

impl EngineConfig {
    /// Load the single structured document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the legacy two-file pair: a control document (everything but
    /// `model`) merged with a model document.
    pub fn load_split(control_path: &Path, model_path: &Path) -> Result<Self> {
        let control_text = std::fs::read_to_string(control_path)
            .with_context(|| format!("read control file {}", control_path.display()))?;
        let mut control: serde_json::Value = serde_json::from_str(&control_text)
            .with_context(|| format!("parse control file {}", control_path.display()))?;
        if !control.is_object() {
            bail!("control file {} is not a JSON object", control_path.display());
        }

        let model = Self::load_model(model_path)?;
        control["model"] = serde_json::to_value(&model)?;

        let cfg: EngineConfig = serde_json::from_value(control)
            .with_context(|| "merge control + model documents")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Re-read just the model document (threshold reload path).
    pub fn load_model(path: &Path) -> Result<ModelConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read model file {}", path.display()))?;
        let model: ModelConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse model file {}", path.display()))?;
        validate_model(&model)?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.leg1.symbol.is_empty() || self.leg2.symbol.is_empty() {
            bail!("both leg symbols must be set");
        }
        if self.leg1.symbol == self.leg2.symbol {
            bail!("legs must be distinct contracts");
        }
        for (name, spec) in [("leg1", &self.leg1), ("leg2", &self.leg2)] {
            if spec.tick_size <= 0.0 {
                bail!("{name}: tick size must be positive");
            }
            if spec.multiplier <= 0.0 {
                bail!("{name}: contract multiplier must be positive");
            }
        }
        validate_model(&self.model)
    }
}

fn validate_model(model: &ModelConfig) -> Result<()> {
    let t = &model.thresholds;
    if !(t.alpha > 0.0 && t.alpha <= 1.0) {
        bail!("alpha must be in (0, 1]");
    }
    if t.max_size <= 0 {
        bail!("max_size must be positive");
    }
    if t.size == 0 {
        bail!("size must be positive");
    }
    if t.avg_spread_away < 2 {
        bail!("avg_spread_away must be at least 2");
    }
    if !(t.short_place <= t.begin_place && t.begin_place <= t.long_place) {
        bail!("place thresholds must satisfy short <= begin <= long");
    }
    if model.ratio <= 0.0 {
        bail!("ratio must be positive");
    }
    Ok(())
}
