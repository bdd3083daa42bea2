//! Common utilities for all binaries
//!
//! Shared CLI parsing, logging setup, and configuration loading.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tandem_core::config::EngineConfig;
use tandem_core::control::StatusSnapshot;

/// Common CLI arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Single structured configuration document
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Legacy control document (paired with --model)
    #[arg(long)]
    pub control: Option<PathBuf>,

    /// Legacy model document; also the reload-thresholds source
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// CPU core to pin the market-data reader to
    #[arg(short = 'c', long)]
    pub cpu_core: Option<usize>,

    /// Log level when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit line-delimited JSON logs
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging.
pub fn init_logging(args: &CommonArgs) {
    tandem_core::utils::logger::init_tracing(&args.log_level, args.json_logs);
}

/// Load the engine configuration from either form. Returns the config
/// plus the model path used for threshold reloads, when one exists.
pub fn load_config(args: &CommonArgs) -> Result<(EngineConfig, Option<PathBuf>)> {
    match (&args.config, &args.control, &args.model) {
        (Some(path), None, None) => {
            let cfg = EngineConfig::load(path)
                .with_context(|| format!("load {}", path.display()))?;
            Ok((cfg, None))
        }
        (None, Some(control), Some(model)) => {
            let cfg = EngineConfig::load_split(control, model)
                .context("load legacy control/model pair")?;
            Ok((cfg, Some(model.clone())))
        }
        _ => bail!("pass either --config, or --control together with --model"),
    }
}

/// Print the closing state of the strategy.
pub fn print_final_status(status: &StatusSnapshot) {
    tracing::info!("=== Final Status ===");
    tracing::info!("State: {}", status.state);
    tracing::info!("Ticks processed: {}", status.ticks);
    tracing::info!("Exposure: {}", status.exposure);
    for leg in &status.legs {
        tracing::info!(
            "{}: net {} (pass {}, agg {}), realized {:.2}, unrealized {:.2}, fills {}, rejects {}",
            leg.symbol,
            leg.net,
            leg.net_passive,
            leg.net_aggressive,
            leg.realized_pnl,
            leg.unrealized_pnl,
            leg.fills_seen,
            leg.reject_count,
        );
    }
    if let Some(err) = status.last_error {
        tracing::warn!("Last error kind: {}", err);
    }
}
