//! Tracing initialisation for binaries
//!
//! Logging stays off the tick hot path; the subscriber here serves the
//! binaries' setup, alerts, and shutdown reporting.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `level` is the default filter when `RUST_LOG` is unset; `json` swaps
/// the human format for line-delimited JSON (log shippers).
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init();
    }
}
