//! Wait-free multi-writer/multi-reader ring queue over shared memory
//!
//! One segment per queue: a 64-byte header followed by `capacity`
//! fixed-size slots. Every slot carries an 8-byte sequence used to
//! coordinate claims, so the protocol needs no process-wide lock:
//!
//! - a writer claims position `p` by CAS on `writer_seq` once
//!   `slot[p % cap].seq == p`, copies the payload, then publishes with
//!   `slot.seq = p + 1`;
//! - a reader claims position `p` by CAS on `reader_seq` once
//!   `slot[p % cap].seq == p + 1`, copies the payload out, then frees the
//!   slot for the next lap with `slot.seq = p + cap`.
//!
//! At most one enqueuer and one dequeuer ever own a given slot claim.
//! The layout is frozen: external producers and consumers attach to the
//! same segments.

use crate::core::EngineError;
use crate::ipc::records::WireRecord;
use crate::ipc::segment::ShmSegment;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Embedded queue header, padded to one cache line.
#[repr(C)]
struct RingHeader {
    capacity: u32,
    elem_size: u32,
    writer_seq: AtomicU64,
    reader_seq: AtomicU64,
    _pad: [u8; 40],
}

const HEADER_LEN: usize = 64;
const SLOT_SEQ_LEN: usize = 8;

/// The queue had no free slot for a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ring full")]
pub struct RingFull;

/// A fixed-capacity record queue in a shared segment
#[derive(Debug)]
pub struct ShmRing<T: WireRecord> {
    seg: ShmSegment,
    capacity: u64,
    stride: usize,
    _marker: PhantomData<T>,
}

impl<T: WireRecord> ShmRing<T> {
    /// Slot stride: per-slot sequence plus the payload rounded up to
    /// 8-byte alignment.
    const fn stride() -> usize {
        SLOT_SEQ_LEN + ((size_of::<T>() + 7) & !7)
    }

    /// Total segment length for a given capacity.
    pub const fn segment_len(capacity: u32) -> usize {
        HEADER_LEN + capacity as usize * Self::stride()
    }

    /// Create a fresh queue of `capacity` slots at `path`.
    pub fn create(path: &Path, capacity: u32) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::IpcFatal {
                detail: format!("ring {}: zero capacity", path.display()),
            });
        }
        let seg = ShmSegment::create(path, Self::segment_len(capacity))?;
        let ring = Self {
            seg,
            capacity: capacity as u64,
            stride: Self::stride(),
            _marker: PhantomData,
        };

        // Seed each slot with its own index: "free for lap zero". The
        // sequence counters start at zero from the zero-filled segment.
        for i in 0..capacity as u64 {
            ring.slot_seq(i).store(i, Ordering::Relaxed);
        }
        // Publish capacity last so a racing open sees a seeded queue.
        unsafe {
            let hdr_mut = ring.seg.as_ptr() as *mut RingHeader;
            ptr::write_volatile(ptr::addr_of_mut!((*hdr_mut).elem_size), size_of::<T>() as u32);
            std::sync::atomic::fence(Ordering::Release);
            ptr::write_volatile(ptr::addr_of_mut!((*hdr_mut).capacity), capacity);
        }
        Ok(ring)
    }

    /// Attach to an existing queue, validating the frozen layout.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let seg = ShmSegment::open(path)?;
        if seg.len() < HEADER_LEN {
            return Err(EngineError::IpcFatal {
                detail: format!("ring {}: segment shorter than header", path.display()),
            });
        }

        let (capacity, elem_size) = unsafe {
            let hdr = &*(seg.as_ptr() as *const RingHeader);
            (hdr.capacity, hdr.elem_size)
        };
        if capacity == 0 {
            return Err(EngineError::IpcFatal {
                detail: format!("ring {}: unseeded header", path.display()),
            });
        }
        if elem_size as usize != size_of::<T>() {
            return Err(EngineError::IpcFatal {
                detail: format!(
                    "ring {}: element size {} != expected {}",
                    path.display(),
                    elem_size,
                    size_of::<T>()
                ),
            });
        }
        if seg.len() != Self::segment_len(capacity) {
            return Err(EngineError::IpcFatal {
                detail: format!("ring {}: segment length mismatch", path.display()),
            });
        }

        Ok(Self {
            seg,
            capacity: capacity as u64,
            stride: Self::stride(),
            _marker: PhantomData,
        })
    }

    /// Attach if the segment exists, otherwise create it.
    pub fn open_or_create(path: &Path, capacity: u32) -> Result<Self, EngineError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, capacity)
        }
    }

    #[inline(always)]
    fn header(&self) -> &RingHeader {
        unsafe { &*(self.seg.as_ptr() as *const RingHeader) }
    }

    #[inline(always)]
    fn slot_ptr(&self, index: u64) -> *mut u8 {
        unsafe { self.seg.as_ptr().add(HEADER_LEN + index as usize * self.stride) }
    }

    #[inline(always)]
    fn slot_seq(&self, index: u64) -> &AtomicU64 {
        unsafe { &*(self.slot_ptr(index) as *const AtomicU64) }
    }

    /// Enqueue one record. Wait-free: returns [`RingFull`] instead of
    /// blocking when no slot is free.
    pub fn try_push(&self, value: &T) -> Result<(), RingFull> {
        let hdr = self.header();
        let mut pos = hdr.writer_seq.load(Ordering::Relaxed);
        loop {
            let index = pos % self.capacity;
            let seq = self.slot_seq(index).load(Ordering::Acquire);
            let dif = seq as i64 - pos as i64;

            if dif == 0 {
                match hdr.writer_seq.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe {
                            ptr::copy_nonoverlapping(
                                value as *const T as *const u8,
                                self.slot_ptr(index).add(SLOT_SEQ_LEN),
                                size_of::<T>(),
                            );
                        }
                        self.slot_seq(index).store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(actual) => pos = actual,
                }
            } else if dif < 0 {
                // Slot still holds an unread record from the previous lap.
                return Err(RingFull);
            } else {
                pos = hdr.writer_seq.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue one record, or `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let hdr = self.header();
        let mut pos = hdr.reader_seq.load(Ordering::Relaxed);
        loop {
            let index = pos % self.capacity;
            let seq = self.slot_seq(index).load(Ordering::Acquire);
            let dif = seq as i64 - (pos + 1) as i64;

            if dif == 0 {
                match hdr.reader_seq.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let mut out = std::mem::MaybeUninit::<T>::uninit();
                        unsafe {
                            ptr::copy_nonoverlapping(
                                self.slot_ptr(index).add(SLOT_SEQ_LEN),
                                out.as_mut_ptr() as *mut u8,
                                size_of::<T>(),
                            );
                        }
                        self.slot_seq(index)
                            .store(pos + self.capacity, Ordering::Release);
                        return Some(unsafe { out.assume_init() });
                    }
                    Err(actual) => pos = actual,
                }
            } else if dif < 0 {
                return None;
            } else {
                pos = hdr.reader_seq.load(Ordering::Relaxed);
            }
        }
    }

    /// Approximate number of unread records.
    pub fn len(&self) -> u64 {
        let hdr = self.header();
        let w = hdr.writer_seq.load(Ordering::Relaxed);
        let r = hdr.reader_seq.load(Ordering::Relaxed);
        w.saturating_sub(r)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ring_at(dir: &tempfile::TempDir, name: &str, cap: u32) -> ShmRing<u64> {
        ShmRing::create(&dir.path().join(name), cap).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let ring = ring_at(&dir, "q", 8);

        for v in 0..5u64 {
            ring.try_push(&v).unwrap();
        }
        for v in 0..5u64 {
            assert_eq!(ring.try_pop(), Some(v));
        }
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_full_and_wraparound() {
        let dir = tempfile::tempdir().unwrap();
        let ring = ring_at(&dir, "q", 4);

        for v in 0..4u64 {
            ring.try_push(&v).unwrap();
        }
        assert_eq!(ring.try_push(&99), Err(RingFull));
        assert_eq!(ring.len(), 4);

        // Drain one, push one: wraps onto the freed slot.
        assert_eq!(ring.try_pop(), Some(0));
        ring.try_push(&4).unwrap();

        // Several laps around the ring.
        for lap in 0..100u64 {
            assert_eq!(ring.try_pop(), Some(lap + 1));
            ring.try_push(&(lap + 5)).unwrap();
        }
    }

    #[test]
    fn test_attach_continues_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");

        let producer: ShmRing<u64> = ShmRing::create(&path, 16).unwrap();
        producer.try_push(&7).unwrap();
        producer.try_push(&8).unwrap();

        let consumer: ShmRing<u64> = ShmRing::open(&path).unwrap();
        assert_eq!(consumer.try_pop(), Some(7));
        assert_eq!(consumer.try_pop(), Some(8));
        assert_eq!(consumer.capacity(), 16);
    }

    #[test]
    fn test_attach_rejects_wrong_element_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        let _producer: ShmRing<u64> = ShmRing::create(&path, 16).unwrap();

        let err = ShmRing::<crate::ipc::records::MdRecord>::open(&path).unwrap_err();
        assert!(format!("{err}").contains("element size"));
    }

    #[test]
    fn test_spsc_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(ring_at(&dir, "q", 64));

        const N: u64 = 10_000;
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for v in 0..N {
                    while ring.try_push(&v).is_err() {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let mut next = 0u64;
        while next < N {
            if let Some(v) = ring.try_pop() {
                assert_eq!(v, next);
                next += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_mpmc_conserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(ring_at(&dir, "q", 32));

        const PER_PRODUCER: u64 = 2_000;
        let mut producers = vec![];
        for p in 0..2u64 {
            let ring = Arc::clone(&ring);
            producers.push(std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let v = p * PER_PRODUCER + i;
                    while ring.try_push(&v).is_err() {
                        std::thread::yield_now();
                    }
                }
            }));
        }

        let consumed = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut consumers = vec![];
        for _ in 0..2 {
            let ring = Arc::clone(&ring);
            let consumed = Arc::clone(&consumed);
            consumers.push(std::thread::spawn(move || {
                let mut seen = vec![];
                while consumed.load(Ordering::Relaxed) < 2 * PER_PRODUCER {
                    match ring.try_pop() {
                        Some(v) => {
                            seen.push(v);
                            consumed.fetch_add(1, Ordering::Relaxed);
                        }
                        None => std::thread::yield_now(),
                    }
                }
                seen
            }));
        }

        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<u64> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..2 * PER_PRODUCER).collect();
        assert_eq!(all, expected);
    }
}
