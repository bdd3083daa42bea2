//! Control plane: commands, status surface, metrics, REST server

pub mod metrics;
pub mod server;
pub mod status;

pub use metrics::Metrics;
pub use server::{ControlServer, ControlServerConfig};
pub use status::{HostStatus, LegStatus, OrderRow, SpreadStatus, StatusSnapshot, ThresholdStatus};

use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Fire-and-forget strategy commands
///
/// Every POST on the control plane maps to one of these; the timer
/// thread drains the queue and applies them under the controller mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// RUNNING → ACTIVE.
    Activate,
    /// ACTIVE → RUNNING (keep positions, stop new quoting).
    Deactivate,
    /// Any state → SQUARING_OFF.
    Squareoff,
    /// Re-read the model file; applied atomically at the next tick.
    ReloadThresholds,
}

/// Bounded command queue between the server and the timer thread
#[derive(Clone)]
pub struct CommandQueue {
    queue: Arc<ArrayQueue<Command>>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    /// Enqueue a command; `Err` maps to HTTP 503.
    pub fn push(&self, cmd: Command) -> Result<(), Command> {
        self.queue.push(cmd)
    }

    pub fn pop(&self) -> Option<Command> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(16)
    }
}
