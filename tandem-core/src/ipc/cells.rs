//! Scalar shared-memory cells
//!
//! Two tiny segments sit beside the ring queues:
//!
//! - the **client store**, an atomic counter handing out client-ids so
//!   several strategy processes can partition one order-id space;
//! - the **t-var cell**, a single double written by an external model
//!   process and read once per tick as an additive offset on the spread
//!   mean. Writes are atomic by alignment; readers tolerate torn updates
//!   by treating the value as a slowly-changing scalar.

use crate::core::EngineError;
use crate::ipc::segment::ShmSegment;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Length of both cell segments.
const CELL_LEN: usize = 8;

/// Cross-process client-id allocator
pub struct ClientStore {
    seg: ShmSegment,
}

impl ClientStore {
    pub fn attach(path: &Path) -> Result<Self, EngineError> {
        let seg = ShmSegment::open_or_create(path, CELL_LEN)?;
        Ok(Self { seg })
    }

    #[inline(always)]
    fn counter(&self) -> &AtomicU32 {
        unsafe { &*(self.seg.as_ptr() as *const AtomicU32) }
    }

    /// Atomically claim the next client-id. Ids start at 1; zero is
    /// reserved so an unseeded cell never collides with a live client.
    pub fn next_client_id(&self) -> u32 {
        self.counter().fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u32 {
        self.counter().load(Ordering::Acquire)
    }
}

/// Externally-written scalar offset on the spread mean
pub struct TvarCell {
    seg: ShmSegment,
}

impl TvarCell {
    pub fn attach(path: &Path) -> Result<Self, EngineError> {
        let seg = ShmSegment::open_or_create(path, CELL_LEN)?;
        Ok(Self { seg })
    }

    #[inline(always)]
    fn bits(&self) -> &AtomicU64 {
        unsafe { &*(self.seg.as_ptr() as *const AtomicU64) }
    }

    /// Relaxed per-tick load. Non-finite garbage (an external writer
    /// mid-update or unseeded memory) reads as zero.
    #[inline]
    pub fn read(&self) -> f64 {
        let v = f64::from_bits(self.bits().load(Ordering::Relaxed));
        if v.is_finite() {
            v
        } else {
            0.0
        }
    }

    /// Producer-side store. In production the writer is an external
    /// process; this is used by tests and tooling.
    pub fn write(&self, value: f64) {
        self.bits().store(value.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_dense_and_start_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClientStore::attach(&dir.path().join("clients")).unwrap();

        assert_eq!(store.issued(), 0);
        assert_eq!(store.next_client_id(), 1);
        assert_eq!(store.next_client_id(), 2);
        assert_eq!(store.issued(), 2);
    }

    #[test]
    fn test_client_store_shared_between_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients");

        let a = ClientStore::attach(&path).unwrap();
        assert_eq!(a.next_client_id(), 1);

        let b = ClientStore::attach(&path).unwrap();
        assert_eq!(b.next_client_id(), 2);
    }

    #[test]
    fn test_tvar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cell = TvarCell::attach(&dir.path().join("tvar")).unwrap();

        assert_eq!(cell.read(), 0.0);
        cell.write(-0.125);
        assert_eq!(cell.read(), -0.125);
    }

    #[test]
    fn test_tvar_non_finite_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cell = TvarCell::attach(&dir.path().join("tvar")).unwrap();

        cell.write(f64::NAN);
        assert_eq!(cell.read(), 0.0);
        cell.write(f64::INFINITY);
        assert_eq!(cell.read(), 0.0);
    }
}
