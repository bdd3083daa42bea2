//! CPU placement helpers
//!
//! The market-data reader is the latency-sensitive thread; pinning it to
//! a dedicated core keeps the spin-then-yield poll loop out of the
//! scheduler's way.

use tracing::debug;

/// Pin the current thread to a core id. Returns whether the pin took.
pub fn pin_to_core(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        debug!("core enumeration unavailable");
        return false;
    };
    match ids.into_iter().find(|c| c.id == core) {
        Some(id) => core_affinity::set_for_current(id),
        None => {
            debug!(core, "requested core not present");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_to_missing_core_is_false() {
        assert!(!pin_to_core(usize::MAX));
    }
}
