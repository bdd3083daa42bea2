//! Tandem Core - Pairwise Futures Arbitrage Runtime
//!
//! Tandem is a futures pair-trading engine: it quotes passively on one
//! leg of a correlated pair, hedges fills aggressively on the other, and
//! talks to an external market-data feeder and order router over
//! lock-free shared-memory ring queues.
//!
//! ## Architecture
//! - **Wait-free IPC**: fixed-layout records in MPMC ring queues, one
//!   mmap'd segment per queue
//! - **Single-writer strategy state**: every mutation serialised by one
//!   mutex, applied by dedicated reader threads
//! - **Net-position accounting**: close-then-open offsets with separate
//!   long/short averages (Chinese-futures convention)
//! - **Restartable**: day-boundary text snapshot of inventory and the
//!   spread mean
//!
//! ## Core Modules
//! - `core`: plain-data types (OrderId, Side, statuses) and error kinds
//! - `ipc`: shared-memory segments, ring queues, wire records, cells
//! - `book`: per-symbol instrument ladder and tick validation
//! - `oms`: working orders, fill accounting, the per-leg order manager
//! - `risk`: loss and reject caps
//! - `host`: queue polling threads, routing, order-id allocation
//! - `snapshot`: day-boundary persistence
//! - `control`: REST control plane, status surface, metrics

pub mod book;
pub mod config;
pub mod control;
pub mod core;
pub mod host;
pub mod ipc;
pub mod oms;
pub mod perf;
pub mod risk;
pub mod snapshot;
pub mod utils;

// Re-export the types nearly every consumer touches.
pub use crate::core::{
    EngineError, EngineState, ErrorKind, HitType, OrderId, OrderStatus, OrderTag, Side,
};
pub use book::{Instrument, InstrumentSpec};
pub use host::{KillSwitch, RequestPipe, Strategy, StrategyEntry, StrategyHost, TvarReader};
pub use oms::{LegManager, LegParams, PositionState};

// Re-export error types the binaries use at their boundaries.
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::book::{Instrument, InstrumentSpec};
    pub use crate::config::EngineConfig;
    pub use crate::control::{Command, CommandQueue, Metrics, StatusSnapshot};
    pub use crate::core::{EngineState, ErrorKind, HitType, OrderId, OrderStatus, OrderTag, Side};
    pub use crate::host::{
        HostConfig, KillSwitch, RequestPipe, Strategy, StrategyEntry, StrategyHost, TvarReader,
    };
    pub use crate::oms::{LegEvent, LegManager, LegParams, PositionState};
    pub use crate::{Error, Result};
}
