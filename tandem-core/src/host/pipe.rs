//! Outbound request staging and order-id allocation
//!
//! The controller never touches the shared-memory request ring directly:
//! it stages [`RequestRecord`]s into a small process-local buffer and a
//! dedicated writer thread drains that buffer into the ring. A full
//! buffer after the bounded retry budget surfaces as `QUEUE_FULL`, which
//! the leg manager treats as a local reject.

use crate::core::{EngineError, OrderId};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-process order-id allocator
///
/// The client-id comes from the shared ClientStore at host start; local
/// sequence numbers are dense from 1.
pub struct OrderIdAllocator {
    client_id: u32,
    local_seq: AtomicU32,
}

impl OrderIdAllocator {
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            local_seq: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn next(&self) -> OrderId {
        let seq = self.local_seq.fetch_add(1, Ordering::Relaxed) + 1;
        OrderId::compose(self.client_id, seq)
    }

    #[inline(always)]
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Whether a response order-id belongs to this process. Foreign ids
    /// are dropped silently: the response queue is shared.
    #[inline(always)]
    pub fn owns(&self, order_id: OrderId) -> bool {
        order_id.client_id() == self.client_id
    }
}

/// Counters shared between the staging side and the writer thread.
#[derive(Debug, Default)]
pub struct PipeStats {
    pub staged: AtomicU64,
    pub drained: AtomicU64,
    pub stage_full: AtomicU64,
    pub ring_full_retries: AtomicU64,
}

/// Process-local staging buffer for outbound requests
#[derive(Clone)]
pub struct RequestPipe {
    buf: Arc<ArrayQueue<crate::ipc::RequestRecord>>,
    stats: Arc<PipeStats>,
    max_retries: u32,
}

impl RequestPipe {
    pub fn new(capacity: usize, max_retries: u32) -> Self {
        Self {
            buf: Arc::new(ArrayQueue::new(capacity)),
            stats: Arc::new(PipeStats::default()),
            max_retries,
        }
    }

    /// Stage a request. Retries with a scheduler yield between attempts
    /// (the writer thread may free a slot); exhaustion is `QUEUE_FULL`.
    pub fn send(&self, rec: crate::ipc::RequestRecord) -> Result<(), EngineError> {
        let mut rec = rec;
        for attempt in 0..=self.max_retries {
            match self.buf.push(rec) {
                Ok(()) => {
                    self.stats.staged.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(back) => {
                    rec = back;
                    if attempt < self.max_retries {
                        std::thread::yield_now();
                    }
                }
            }
        }
        self.stats.stage_full.fetch_add(1, Ordering::Relaxed);
        Err(EngineError::QueueFull {
            retries: self.max_retries,
        })
    }

    /// Writer-thread side: take one staged request, if any.
    pub fn drain_one(&self) -> Option<crate::ipc::RequestRecord> {
        let rec = self.buf.pop();
        if rec.is_some() {
            self.stats.drained.fetch_add(1, Ordering::Relaxed);
        }
        rec
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn stats(&self) -> &PipeStats {
        &self.stats
    }

    pub(crate) fn note_ring_retry(&self) {
        self.stats.ring_full_retries.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::ipc::RequestRecord;

    #[test]
    fn test_allocator_namespace() {
        let alloc = OrderIdAllocator::new(4);
        let a = alloc.next();
        let b = alloc.next();
        assert_eq!(a.raw(), 4_000_001);
        assert_eq!(b.raw(), 4_000_002);
        assert!(alloc.owns(a));
        assert!(!alloc.owns(OrderId::compose(5, 1)));
    }

    #[test]
    fn test_pipe_round_trip() {
        let pipe = RequestPipe::new(4, 0);
        let mut rec = RequestRecord::zeroed();
        rec.order_id = 42;
        pipe.send(rec).unwrap();

        let out = pipe.drain_one().unwrap();
        assert_eq!(out.order_id, 42);
        assert!(pipe.drain_one().is_none());
    }

    #[test]
    fn test_pipe_full_is_queue_full() {
        let pipe = RequestPipe::new(2, 1);
        pipe.send(RequestRecord::zeroed()).unwrap();
        pipe.send(RequestRecord::zeroed()).unwrap();

        let err = pipe.send(RequestRecord::zeroed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueFull);
        assert_eq!(pipe.stats().stage_full.load(Ordering::Relaxed), 1);
    }
}
