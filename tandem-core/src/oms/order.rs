//! Working-order record
//!
//! One [`Order`] per live order on a leg, keyed by router order-id in the
//! leg manager's map. Created on an outbound NEWORDER, removed when the
//! open quantity reaches zero or a terminal reject/cancel lands.

use crate::core::{HitType, OrderId, OrderStatus, OrderTag, Side};

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub price: f64,
    pub total_qty: u32,
    pub filled_qty: u32,
    pub cancelled_qty: u32,
    pub status: OrderStatus,
    pub hit_type: HitType,
    pub tag: OrderTag,
    pub updated_ns: u64,
    /// Exchange-assigned id, attached on NEW_CONFIRM.
    pub exchange_order_id: u64,
    /// The router has acknowledged this order at least once. Orders
    /// still awaiting their first response are in flight, not open.
    pub confirmed: bool,
    /// Latest coalesced modify intent while a modify is in flight.
    /// Intermediate intents are dropped silently.
    pub modify_next: Option<(f64, u32)>,
    /// A cancel requested while a modify was pending; fires after the
    /// modify confirms or rejects.
    pub cancel_queued: bool,
}

impl Order {
    pub fn new(
        id: OrderId,
        side: Side,
        price: f64,
        qty: u32,
        hit_type: HitType,
        tag: OrderTag,
        now_ns: u64,
    ) -> Self {
        Self {
            id,
            side,
            price,
            total_qty: qty,
            filled_qty: 0,
            cancelled_qty: 0,
            status: OrderStatus::New,
            hit_type,
            tag,
            updated_ns: now_ns,
            exchange_order_id: 0,
            confirmed: false,
            modify_next: None,
            cancel_queued: false,
        }
    }

    /// Quantity still working: total minus filled minus cancelled.
    #[inline(always)]
    pub fn open_qty(&self) -> u32 {
        self.total_qty
            .saturating_sub(self.filled_qty)
            .saturating_sub(self.cancelled_qty)
    }

    #[inline(always)]
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Confirmed resting on the exchange with quantity still open.
    #[inline(always)]
    pub fn is_confirmed_open(&self) -> bool {
        self.confirmed && !self.status.is_terminal() && self.open_qty() > 0
    }

    #[inline(always)]
    pub fn modify_in_flight(&self) -> bool {
        self.status == OrderStatus::ModifyPending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            OrderId::compose(1, 1),
            Side::Buy,
            100.0,
            10,
            HitType::Standard,
            OrderTag::Quote,
            0,
        )
    }

    #[test]
    fn test_open_qty_arithmetic() {
        let mut o = order();
        assert_eq!(o.open_qty(), 10);
        o.filled_qty = 4;
        assert_eq!(o.open_qty(), 6);
        o.cancelled_qty = 6;
        assert_eq!(o.open_qty(), 0);
    }

    #[test]
    fn test_open_qty_saturates() {
        let mut o = order();
        o.filled_qty = 12;
        assert_eq!(o.open_qty(), 0);
    }

    #[test]
    fn test_confirmed_open_excludes_in_flight() {
        let mut o = order();
        assert!(o.is_live());
        assert!(!o.is_confirmed_open());

        o.confirmed = true;
        o.status = OrderStatus::NewConfirm;
        assert!(o.is_confirmed_open());

        o.status = OrderStatus::CancelPending;
        assert!(o.is_confirmed_open());

        o.status = OrderStatus::Traded;
        assert!(!o.is_live());
        assert!(!o.is_confirmed_open());
    }

    #[test]
    fn test_cancel_pending_before_confirm_is_not_open() {
        let mut o = order();
        // Cancelled while still in flight: never acknowledged.
        o.status = OrderStatus::CancelPending;
        assert!(!o.is_confirmed_open());
    }
}
