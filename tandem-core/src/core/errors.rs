//! Domain error types for the strategy runtime
//!
//! Every error with external significance maps to a named [`ErrorKind`]
//! surfaced in the status JSON and counted in the runtime statistics.

use serde::Serialize;
use std::fmt;

/// Externally-visible failure classification
///
/// These names are part of the operational contract: they appear verbatim
/// in `/status` and in alerts surfaced upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "QUEUE_FULL")]
    QueueFull,
    #[serde(rename = "ORDER_REJECTED")]
    OrderRejected,
    #[serde(rename = "RISK_BREACH")]
    RiskBreach,
    #[serde(rename = "SNAPSHOT_IO")]
    SnapshotIo,
    #[serde(rename = "IPC_FATAL")]
    IpcFatal,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::OrderRejected => "ORDER_REJECTED",
            ErrorKind::RiskBreach => "RISK_BREACH",
            ErrorKind::SnapshotIo => "SNAPSHOT_IO",
            ErrorKind::IpcFatal => "IPC_FATAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the engine core
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request ring (or the process-local staging buffer) stayed full
    /// past the bounded retry budget. Surfaced as a local reject for the
    /// originating order.
    #[error("request queue full after {retries} retries")]
    QueueFull { retries: u32 },

    /// An outbound order was rejected before reaching the router
    /// (open-order cap, off-grid price, size past the position cap).
    #[error("order rejected locally: {reason}")]
    OrderRejected { reason: String },

    /// A risk cap was breached; the controller escalates to squareoff.
    #[error("risk breach: {detail}")]
    RiskBreach { detail: String },

    /// Day-boundary snapshot could not be read or written.
    #[error("snapshot i/o: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Shared-memory attach/create failure. Fatal at startup; no partial
    /// recovery is attempted.
    #[error("ipc fatal: {detail}")]
    IpcFatal { detail: String },

    /// The order referenced by a modify/cancel does not exist or is in a
    /// state that cannot accept the request.
    #[error("order {order_id} not modifiable: {reason}")]
    BadOrderState { order_id: u32, reason: &'static str },
}

impl EngineError {
    /// Map to the externally-visible kind. Internal-only errors
    /// (`BadOrderState`) report as order rejects.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::QueueFull { .. } => ErrorKind::QueueFull,
            EngineError::OrderRejected { .. } => ErrorKind::OrderRejected,
            EngineError::RiskBreach { .. } => ErrorKind::RiskBreach,
            EngineError::SnapshotIo(_) => ErrorKind::SnapshotIo,
            EngineError::IpcFatal { .. } => ErrorKind::IpcFatal,
            EngineError::BadOrderState { .. } => ErrorKind::OrderRejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::QueueFull.as_str(), "QUEUE_FULL");
        assert_eq!(ErrorKind::IpcFatal.as_str(), "IPC_FATAL");
        assert_eq!(format!("{}", ErrorKind::RiskBreach), "RISK_BREACH");
    }

    #[test]
    fn test_kind_serializes_to_wire_name() {
        let json = serde_json::to_string(&ErrorKind::SnapshotIo).unwrap();
        assert_eq!(json, "\"SNAPSHOT_IO\"");
    }

    #[test]
    fn test_engine_error_kinds() {
        let err = EngineError::QueueFull { retries: 8 };
        assert_eq!(err.kind(), ErrorKind::QueueFull);

        let err = EngineError::BadOrderState {
            order_id: 1,
            reason: "modify while pending",
        };
        assert_eq!(err.kind(), ErrorKind::OrderRejected);
    }

    #[test]
    fn test_display_carries_context() {
        let err = EngineError::QueueFull { retries: 16 };
        assert!(format!("{}", err).contains("16"));
    }
}
