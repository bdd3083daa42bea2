//! Core plain-data types and error taxonomy

pub mod errors;
pub mod types;

pub use errors::{EngineError, ErrorKind};
pub use types::{
    EngineState, HitType, OffsetFlag, OrderDuration, OrderId, OrderKind, OrderStatus, OrderTag,
    RequestKind, ResponseKind, Side, ORDER_ID_SPAN,
};
