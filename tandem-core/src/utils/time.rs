//! Wall-clock helpers
//!
//! The hedger's re-price window and the order records use wall-clock
//! time. Event handlers prefer the local timestamp stamped on the
//! inbound record so replays stay deterministic; these helpers cover the
//! paths with no record in hand.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
#[inline]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    now_ns() / 1_000_000
}
