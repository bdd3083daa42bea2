//! Pairwise arbitrage strategy process
//!
//! Wires the full runtime together:
//! - attaches the three shared-memory queues, the client store, and the
//!   t-var cell (queues must be reachable; attach failure exits non-zero);
//! - restores the day-start snapshot and builds the pair controller;
//! - starts the REST control plane;
//! - runs the host's polling threads until the controller stops.
//!
//! The strategy comes up RUNNING (fills for carried positions are
//! processed, quoting off). Activate via `POST /strategy/activate`, or
//! pass `--activate` to enter the full loop immediately. Ctrl-C trips
//! the kill switch, which squares off and exits once flat.

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tandem_bins::common::{init_logging, load_config, print_final_status, CommonArgs};
use tandem_core::control::{
    Command, CommandQueue, ControlServer, ControlServerConfig, Metrics, StatusSnapshot,
};
use tandem_core::host::{HostConfig, KillSwitch, Strategy, StrategyEntry, StrategyHost};
use tandem_core::snapshot;
use tandem_strategies::PairStrategy;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pairwise futures arbitrage runtime")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Enter the full quoting loop immediately instead of waiting for
    /// POST /strategy/activate
    #[arg(long)]
    activate: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common);

    let (cfg, model_path) = load_config(&args.common)?;
    info!("=== Tandem: pair strategy {} ===", cfg.strategy_id);
    info!(
        "Legs: {} (passive) / {} (hedge), ratio {}",
        cfg.leg1.symbol, cfg.leg2.symbol, cfg.model.ratio
    );

    let kill = KillSwitch::new();
    let kill_ctrlc = kill.clone();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, squaring off");
        kill_ctrlc.trip("operator interrupt");
    })
    .context("install Ctrl-C handler")?;

    // Shared-memory attach; any failure here is fatal by design.
    let host = StrategyHost::attach(HostConfig::from_engine(&cfg, args.common.cpu_core), kill)
        .context("attach shared-memory segments")?;
    info!("Attached queues, client-id {}", host.client_id());

    // Day-start state (a missing snapshot degrades to zero state).
    let day_start = snapshot::load(&cfg.snapshot_path, cfg.strategy_id);

    let strategy = Arc::new(Mutex::new(PairStrategy::new(
        &cfg,
        day_start,
        model_path,
        host.tvar(),
        host.allocator(),
        host.pipe(),
    )));

    let commands = CommandQueue::new(16);
    let status = Arc::new(RwLock::new(StatusSnapshot::empty(cfg.strategy_id)));
    let metrics = Arc::new(Metrics::new().context("build metrics registry")?);

    // Control plane on its own runtime thread.
    let listen_addr = cfg
        .control
        .listen
        .parse()
        .with_context(|| format!("parse control listen address {}", cfg.control.listen))?;
    let server = ControlServer::new(
        ControlServerConfig { listen_addr },
        Arc::clone(&status),
        commands.clone(),
        Arc::clone(&metrics),
    );
    let _control_thread = server.spawn();

    if args.activate {
        commands
            .push(Command::Activate)
            .ok()
            .context("queue initial activate")?;
        info!("Auto-activation queued");
    }

    let entries = vec![StrategyEntry {
        strategy: Arc::clone(&strategy),
        strategy_id: cfg.strategy_id,
        symbols: vec![cfg.leg1.symbol.clone(), cfg.leg2.symbol.clone()],
    }];

    host.run(entries, commands, status, metrics)
        .context("host run")?;

    print_final_status(&strategy.lock().status());
    info!("Shutdown complete");
    Ok(())
}
