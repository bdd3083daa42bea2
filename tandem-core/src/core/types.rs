//! Core types for the pair-trading runtime
//!
//! All types in this module are plain data designed for:
//! - Copy semantics
//! - Single-byte enum representations (they travel inside wire records)
//! - No heap allocations

use std::fmt;

/// Order-id namespace width per client.
///
/// The router-facing order-id space is partitioned between strategy
/// processes: `order_id = client_id * ORDER_ID_SPAN + local_seq`.
/// Collision-free up to one million orders per client per lifetime.
pub const ORDER_ID_SPAN: u32 = 1_000_000;

/// Router-assigned order identifier
///
/// A `u32` namespaced by the owning process' client-id so that multiple
/// strategy processes can share one request queue. Responses carrying an
/// id from a foreign namespace are dropped without logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[repr(transparent)]
pub struct OrderId(pub u32);

impl OrderId {
    /// Compose an id from a client namespace and a local sequence number.
    #[inline(always)]
    pub const fn compose(client_id: u32, local_seq: u32) -> Self {
        Self(client_id * ORDER_ID_SPAN + local_seq)
    }

    /// Raw wire value.
    #[inline(always)]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Client namespace this id belongs to.
    #[inline(always)]
    pub const fn client_id(&self) -> u32 {
        self.0 / ORDER_ID_SPAN
    }

    /// Per-client sequence component.
    #[inline(always)]
    pub const fn local_seq(&self) -> u32 {
        self.0 % ORDER_ID_SPAN
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for OrderId {
    #[inline(always)]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Order side (Buy or Sell)
///
/// Single byte enum; `to_wire` maps to the router's 'B'/'S' transaction
/// type bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    #[inline(always)]
    pub const fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Signed direction: +1 for buys, -1 for sells.
    #[inline(always)]
    pub const fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    /// Router transaction-type byte.
    #[inline(always)]
    pub const fn to_wire(&self) -> u8 {
        match self {
            Side::Buy => b'B',
            Side::Sell => b'S',
        }
    }

    pub const fn from_wire(b: u8) -> Option<Side> {
        match b {
            b'B' => Some(Side::Buy),
            b'S' => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Working-order lifecycle status
///
/// Mirrors the router's confirm/reject protocol. An order leaves the
/// working map when it reaches a terminal status or its open quantity
/// drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    NewConfirm = 1,
    NewReject = 2,
    ModifyPending = 3,
    ModifyConfirm = 4,
    ModifyReject = 5,
    CancelPending = 6,
    CancelConfirm = 7,
    CancelReject = 8,
    Traded = 9,
}

impl OrderStatus {
    /// Terminal statuses remove the order from the working map.
    #[inline(always)]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::NewReject | OrderStatus::CancelConfirm | OrderStatus::Traded
        )
    }
}

/// How an order is expected to interact with the book
///
/// Passive quotes sit in the book (`Standard`), `Improve` steps one tick
/// inside the touch, `Cross` is priced through the opposite side to fill
/// immediately. `Detect` and `Match` are router-side classifications
/// echoed back on fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum HitType {
    Standard = 0,
    Improve = 1,
    Cross = 2,
    Detect = 3,
    Match = 4,
}

impl HitType {
    /// Fills from these hit types accrue to the passive position bucket.
    #[inline(always)]
    pub const fn is_passive(&self) -> bool {
        matches!(self, HitType::Standard | HitType::Improve)
    }

    /// Fills from these hit types accrue to the aggressive position bucket.
    #[inline(always)]
    pub const fn is_aggressive(&self) -> bool {
        matches!(self, HitType::Cross)
    }
}

/// Role an order plays inside the pair strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum OrderTag {
    Quote = 0,
    PassiveHedge = 1,
    AggressiveHedge = 2,
}

/// Router request type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestKind {
    NewOrder = 1,
    ModifyOrder = 2,
    CancelOrder = 3,
    Inquiry = 4,
}

/// Router response type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseKind {
    NewConfirm = 1,
    NewReject = 2,
    ModifyConfirm = 3,
    ModifyReject = 4,
    CancelConfirm = 5,
    CancelReject = 6,
    TradeConfirm = 7,
}

impl ResponseKind {
    pub const fn from_wire(b: u8) -> Option<ResponseKind> {
        match b {
            1 => Some(ResponseKind::NewConfirm),
            2 => Some(ResponseKind::NewReject),
            3 => Some(ResponseKind::ModifyConfirm),
            4 => Some(ResponseKind::ModifyReject),
            5 => Some(ResponseKind::CancelConfirm),
            6 => Some(ResponseKind::CancelReject),
            7 => Some(ResponseKind::TradeConfirm),
            _ => None,
        }
    }
}

/// Order pricing type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderKind {
    Limit = 1,
    Market = 2,
}

/// Order duration, represented by the router's single-byte codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderDuration {
    Day = b'D',
    Ioc = b'I',
    Fok = b'F',
}

/// Position offset flag (Chinese-futures convention)
///
/// Exchanges distinguishing close-today from close-yesterday receive
/// `CloseToday`/`CloseYesterday`; the rest collapse both into `Close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OffsetFlag {
    Open = b'O',
    CloseToday = b'T',
    CloseYesterday = b'Y',
    Close = b'C',
}

/// Pair controller lifecycle state
///
/// ```text
/// Init ──▶ Running ◀──▶ Active
///             │            │
///             └──▶ SquaringOff ──▶ Stopped
/// ```
///
/// `Running` processes fills for carried positions but does not quote;
/// `Active` runs the full loop; `SquaringOff` cancels and flattens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum EngineState {
    #[serde(rename = "INIT")]
    Init = 0,
    #[serde(rename = "RUNNING")]
    Running = 1,
    #[serde(rename = "ACTIVE")]
    Active = 2,
    #[serde(rename = "DEACTIVATING")]
    Deactivating = 3,
    #[serde(rename = "SQUARING_OFF")]
    SquaringOff = 4,
    #[serde(rename = "STOPPED")]
    Stopped = 5,
}

impl EngineState {
    pub const fn name(&self) -> &'static str {
        match self {
            EngineState::Init => "INIT",
            EngineState::Running => "RUNNING",
            EngineState::Active => "ACTIVE",
            EngineState::Deactivating => "DEACTIVATING",
            EngineState::SquaringOff => "SQUARING_OFF",
            EngineState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_namespace() {
        let id = OrderId::compose(7, 42);
        assert_eq!(id.raw(), 7_000_042);
        assert_eq!(id.client_id(), 7);
        assert_eq!(id.local_seq(), 42);
    }

    #[test]
    fn test_order_id_display() {
        let id = OrderId::compose(3, 1);
        assert_eq!(format!("{}", id), "3000001");
    }

    #[test]
    fn test_side_wire_round_trip() {
        assert_eq!(Side::from_wire(Side::Buy.to_wire()), Some(Side::Buy));
        assert_eq!(Side::from_wire(Side::Sell.to_wire()), Some(Side::Sell));
        assert_eq!(Side::from_wire(b'X'), None);
    }

    #[test]
    fn test_side_sign_and_opposite() {
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.sign(), -1);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::NewReject.is_terminal());
        assert!(OrderStatus::CancelConfirm.is_terminal());
        assert!(OrderStatus::Traded.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::ModifyPending.is_terminal());
        assert!(!OrderStatus::CancelReject.is_terminal());
    }

    #[test]
    fn test_hit_type_buckets() {
        assert!(HitType::Standard.is_passive());
        assert!(HitType::Improve.is_passive());
        assert!(!HitType::Cross.is_passive());
        assert!(HitType::Cross.is_aggressive());
        assert!(!HitType::Detect.is_aggressive());
    }

    #[test]
    fn test_enum_sizes() {
        assert_eq!(std::mem::size_of::<Side>(), 1);
        assert_eq!(std::mem::size_of::<OrderStatus>(), 1);
        assert_eq!(std::mem::size_of::<HitType>(), 1);
        assert_eq!(std::mem::size_of::<RequestKind>(), 1);
        assert_eq!(std::mem::size_of::<ResponseKind>(), 1);
        assert_eq!(std::mem::size_of::<OrderDuration>(), 1);
        assert_eq!(std::mem::size_of::<OffsetFlag>(), 1);
        assert_eq!(std::mem::size_of::<OrderId>(), 4);
    }

    #[test]
    fn test_duration_wire_bytes() {
        assert_eq!(OrderDuration::Day as u8, b'D');
        assert_eq!(OrderDuration::Ioc as u8, b'I');
        assert_eq!(OrderDuration::Fok as u8, b'F');
    }

    #[test]
    fn test_response_kind_from_wire() {
        assert_eq!(ResponseKind::from_wire(7), Some(ResponseKind::TradeConfirm));
        assert_eq!(ResponseKind::from_wire(0), None);
        assert_eq!(ResponseKind::from_wire(8), None);
    }

    #[test]
    fn test_engine_state_names() {
        assert_eq!(EngineState::SquaringOff.name(), "SQUARING_OFF");
        assert_eq!(format!("{}", EngineState::Active), "ACTIVE");
    }
}
