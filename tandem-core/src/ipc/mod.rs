//! Shared-memory IPC: segments, ring queues, wire records, scalar cells

pub mod cells;
pub mod records;
pub mod ring;
pub mod segment;

pub use cells::{ClientStore, TvarCell};
pub use records::{
    decode_symbol, encode_symbol, MdRecord, RequestRecord, ResponseRecord, WireLevel, WireRecord,
    DEPTH, SYMBOL_LEN,
};
pub use ring::{RingFull, ShmRing};
pub use segment::{cell_path, queue_path, ShmSegment};
