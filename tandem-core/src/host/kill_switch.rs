//! Process-wide kill switch
//!
//! Tripped by Ctrl-C, fatal transport errors, or operator action. The
//! timer thread polls it and escalates to controller squareoff; trading
//! never resumes after a trip.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct KillSwitch {
    inner: Arc<Inner>,
}

struct Inner {
    tripped: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tripped: AtomicBool::new(false),
                reason: Mutex::new(None),
            }),
        }
    }

    /// Trip the switch. The first reason wins; later trips are ignored.
    pub fn trip(&self, reason: &str) {
        if self
            .inner
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            error!(reason, "kill switch tripped");
            *self.inner.reason.lock() = Some(reason.to_string());
        }
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.inner.tripped.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let k = KillSwitch::new();
        assert!(!k.is_tripped());
        assert_eq!(k.reason(), None);

        k.trip("ring full");
        k.trip("ctrl-c");
        assert!(k.is_tripped());
        assert_eq!(k.reason().as_deref(), Some("ring full"));
    }

    #[test]
    fn test_clones_share_state() {
        let k = KillSwitch::new();
        let k2 = k.clone();
        k.trip("x");
        assert!(k2.is_tripped());
    }
}
