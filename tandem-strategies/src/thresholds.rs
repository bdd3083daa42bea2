//! Dynamic threshold engine
//!
//! Converts the configured deviation thresholds and the passive leg's
//! current inventory into the four per-tick price thresholds the quoting
//! loop consumes. The longer the book already is, the harder adding
//! gets and the easier reducing gets; the offsets change sign with the
//! position because `net/max_size` is signed.

use serde::Serialize;
pub use tandem_core::config::ThresholdSet;

/// Per-tick derived thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedThresholds {
    pub bid_place: f64,
    pub ask_place: f64,
    pub bid_remove: f64,
    pub ask_remove: f64,
}

fn scale(begin: f64, long: f64, short: f64, net: i64, max_size: i64) -> (f64, f64) {
    let l = long - begin;
    let s = begin - short;
    let frac = net as f64 / max_size as f64;

    if net == 0 {
        (begin, begin)
    } else if net > 0 {
        (begin + l * frac, begin - s * frac)
    } else {
        (begin + s * frac, begin - l * frac)
    }
}

/// Derive the four thresholds for the current passive net position.
pub fn derive(t: &ThresholdSet, net_pass: i64) -> DerivedThresholds {
    let (bid_place, ask_place) =
        scale(t.begin_place, t.long_place, t.short_place, net_pass, t.max_size);
    let (bid_remove, ask_remove) = scale(
        t.begin_remove,
        t.long_remove,
        t.short_remove,
        net_pass,
        t.max_size,
    );
    DerivedThresholds {
        bid_place,
        ask_place,
        bid_remove,
        ask_remove,
    }
}
