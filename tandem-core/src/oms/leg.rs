//! Per-leg order manager
//!
//! Owns the working-order map for one leg, issues every router request
//! for that leg, applies every response into the position state, and
//! answers the queries the pair controller needs (working quotes, nets,
//! PnL, squared-off).
//!
//! Sequencing rules:
//! - a modify while another modify is in flight is coalesced — only the
//!   latest price/qty is kept;
//! - a cancel while a modify is in flight queues behind the modify's
//!   confirm or reject;
//! - a fill past the open quantity is clamped to zero and logged as an
//!   anomaly, and the order is treated as traded.

use crate::book::InstrumentSpec;
use crate::core::{
    EngineError, ErrorKind, HitType, OffsetFlag, OrderDuration, OrderId, OrderKind, OrderStatus,
    OrderTag, RequestKind, ResponseKind, Side,
};
use crate::host::pipe::{OrderIdAllocator, RequestPipe};
use crate::ipc::records::{encode_symbol, RequestRecord, ResponseRecord, SYMBOL_LEN};
use crate::oms::order::Order;
use crate::oms::position::PositionState;
use crate::utils::time;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Leg-level parameters from the model file
#[derive(Debug, Clone)]
pub struct LegParams {
    pub strategy_id: i32,
    pub account: String,
    /// Absolute position cap (lots).
    pub max_size: i64,
    /// Cap on simultaneously working orders for this leg.
    pub max_open_orders: usize,
    /// Exchange cost rate, tallied per lot outside gross PnL.
    pub fee_per_lot: f64,
}

/// A fill applied by [`LegManager::on_response`]
#[derive(Debug, Clone, Copy)]
pub struct FillEvent {
    pub order_id: OrderId,
    pub side: Side,
    pub price: f64,
    pub qty: u32,
    pub hit_type: HitType,
    pub tag: OrderTag,
    /// The fill zeroed the order's open quantity.
    pub completed: bool,
}

/// What a response did to this leg
#[derive(Debug, Clone, Copy)]
pub enum LegEvent {
    None,
    Accepted(OrderId),
    Rejected(OrderId),
    Fill(FillEvent),
    Cancelled(OrderId),
    ModifyApplied(OrderId),
    ModifyReverted(OrderId),
}

enum FollowUp {
    None,
    Modify(OrderId, f64, u32),
    Cancel(OrderId),
}

/// Convert an internal lot quantity to the wire unit for this contract.
fn lots_to_wire(spec: &InstrumentSpec, lots: u32) -> u32 {
    if spec.send_in_lots {
        lots
    } else {
        lots.saturating_mul(spec.lot_size)
    }
}

/// Convert a wire quantity back to lots.
fn wire_to_lots(spec: &InstrumentSpec, wire: u32) -> u32 {
    if spec.send_in_lots || spec.lot_size <= 1 {
        wire
    } else {
        wire / spec.lot_size
    }
}

/// Order manager for one leg of the pair
pub struct LegManager {
    spec: InstrumentSpec,
    params: LegParams,
    orders: HashMap<u32, Order>,
    position: PositionState,

    /// Net of fills from passive hit types (STANDARD/IMPROVE), plus the
    /// carried yesterday-passive quantity.
    net_passive: i64,
    /// Net of fills from aggressive hit types (CROSS), plus the carried
    /// yesterday-aggressive quantity.
    net_aggressive: i64,

    reject_count: u32,
    cancel_count: u32,
    anomaly_count: u32,
    orders_sent: u64,
    fills_seen: u64,
    last_error: Option<ErrorKind>,

    symbol_field: [u8; SYMBOL_LEN],
    account_field: [u8; SYMBOL_LEN],

    alloc: Arc<OrderIdAllocator>,
    pipe: RequestPipe,
}

impl LegManager {
    pub fn new(
        spec: InstrumentSpec,
        params: LegParams,
        alloc: Arc<OrderIdAllocator>,
        pipe: RequestPipe,
    ) -> Self {
        let position = PositionState::new(spec.multiplier, params.fee_per_lot);
        let symbol_field = encode_symbol(&spec.symbol);
        let account_field = encode_symbol(&params.account);
        Self {
            spec,
            params,
            orders: HashMap::new(),
            position,
            net_passive: 0,
            net_aggressive: 0,
            reject_count: 0,
            cancel_count: 0,
            anomaly_count: 0,
            orders_sent: 0,
            fills_seen: 0,
            last_error: None,
            symbol_field,
            account_field,
            alloc,
            pipe,
        }
    }

    /// Seed carried positions from the day-start snapshot. Passive and
    /// aggressive buckets are restored separately so the exposure
    /// computation is correct from the first evaluation.
    pub fn seed_carry(&mut self, passive: i64, aggressive: i64) {
        self.position.seed_carry(passive + aggressive);
        self.net_passive += passive;
        self.net_aggressive += aggressive;
    }

    // ------------------------------------------------------------------
    // Outbound requests
    // ------------------------------------------------------------------

    fn base_request(&self) -> RequestRecord {
        let mut req = RequestRecord::zeroed();
        req.symbol = self.symbol_field;
        req.account = self.account_field;
        req.token = self.spec.token;
        req.exchange = self.spec.exchange;
        req.expiry = self.spec.expiry;
        req.strategy_id = self.params.strategy_id;
        req.ts_ns = time::now_ns();
        req
    }

    /// Offset flag for an order that would reduce the current position:
    /// carried lots close as yesterday, the rest as today.
    fn closing_offset(&self) -> OffsetFlag {
        if self.position.ytd_remaining() > 0 {
            OffsetFlag::CloseYesterday
        } else {
            OffsetFlag::CloseToday
        }
    }

    fn offset_for(&self, side: Side) -> OffsetFlag {
        let net = self.position.net();
        let closing = (side == Side::Sell && net > 0) || (side == Side::Buy && net < 0);
        if closing {
            self.closing_offset()
        } else {
            OffsetFlag::Open
        }
    }

    fn count_reject(&mut self, kind: ErrorKind) {
        self.reject_count += 1;
        self.last_error = Some(kind);
    }

    /// Place a new order on this leg.
    ///
    /// Local rejections (off-grid price, zero quantity, position cap,
    /// open-order cap, staging buffer full) never reach the router; they
    /// bump the reject count and return the error.
    pub fn send_new(
        &mut self,
        side: Side,
        price: f64,
        qty: u32,
        hit_type: HitType,
        tag: OrderTag,
    ) -> Result<OrderId, EngineError> {
        if qty == 0 {
            self.count_reject(ErrorKind::OrderRejected);
            return Err(EngineError::OrderRejected {
                reason: "zero quantity".into(),
            });
        }
        let ticks = price / self.spec.tick_size;
        if !(price.is_finite() && price > 0.0 && (ticks - ticks.round()).abs() < 1e-6) {
            self.count_reject(ErrorKind::OrderRejected);
            return Err(EngineError::OrderRejected {
                reason: format!("price {price} off the {} grid", self.spec.tick_size),
            });
        }

        let net = self.position.net();
        let extending = (side == Side::Buy && net >= 0) || (side == Side::Sell && net <= 0);
        if extending && qty as i64 > self.params.max_size - net.abs() {
            self.count_reject(ErrorKind::OrderRejected);
            return Err(EngineError::OrderRejected {
                reason: format!(
                    "qty {} past position cap {} (net {})",
                    qty, self.params.max_size, net
                ),
            });
        }

        let live = self.orders.values().filter(|o| o.is_live()).count();
        if live >= self.params.max_open_orders {
            warn!(
                symbol = %self.spec.symbol,
                live, cap = self.params.max_open_orders,
                "open-order cap hit, rejecting locally"
            );
            self.count_reject(ErrorKind::OrderRejected);
            return Err(EngineError::OrderRejected {
                reason: "open-order cap".into(),
            });
        }

        let id = self.alloc.next();
        let mut req = self.base_request();
        req.order_id = id.raw();
        req.price = price;
        req.qty = lots_to_wire(&self.spec, qty);
        let duration = if hit_type.is_aggressive() {
            OrderDuration::Ioc
        } else {
            OrderDuration::Day
        };
        req.set_codes(
            RequestKind::NewOrder,
            OrderKind::Limit,
            duration,
            side,
            self.offset_for(side),
        );

        if let Err(e) = self.pipe.send(req) {
            // Queue full after bounded retry: local reject, no order state.
            self.count_reject(e.kind());
            return Err(e);
        }

        self.orders
            .insert(id.raw(), Order::new(id, side, price, qty, hit_type, tag, req.ts_ns));
        self.orders_sent += 1;
        Ok(id)
    }

    /// Modify a working order's price/quantity.
    ///
    /// While a modify is already in flight the new intent replaces any
    /// previously queued one; it fires when the in-flight modify
    /// resolves.
    pub fn modify(&mut self, id: OrderId, price: f64, qty: u32) -> Result<(), EngineError> {
        let order = self.orders.get_mut(&id.raw()).ok_or(EngineError::BadOrderState {
            order_id: id.raw(),
            reason: "unknown order",
        })?;

        if order.modify_in_flight() {
            order.modify_next = Some((price, qty));
            return Ok(());
        }
        if order.status != OrderStatus::NewConfirm {
            return Err(EngineError::BadOrderState {
                order_id: id.raw(),
                reason: "not confirmed",
            });
        }

        let side = order.side;
        let filled = order.filled_qty;
        let offset = self.offset_for(side);

        let mut req = self.base_request();
        req.order_id = id.raw();
        req.price = price;
        req.qty = lots_to_wire(&self.spec, qty);
        req.qty_filled = lots_to_wire(&self.spec, filled);
        req.set_codes(
            RequestKind::ModifyOrder,
            OrderKind::Limit,
            OrderDuration::Day,
            side,
            offset,
        );

        match self.pipe.send(req) {
            Ok(()) => {
                if let Some(order) = self.orders.get_mut(&id.raw()) {
                    order.status = OrderStatus::ModifyPending;
                    order.updated_ns = req.ts_ns;
                }
                Ok(())
            }
            Err(e) => {
                self.count_reject(e.kind());
                Err(e)
            }
        }
    }

    /// Cancel a working order. Queues behind an in-flight modify.
    pub fn cancel(&mut self, id: OrderId) -> Result<(), EngineError> {
        let order = self.orders.get_mut(&id.raw()).ok_or(EngineError::BadOrderState {
            order_id: id.raw(),
            reason: "unknown order",
        })?;
        if !order.is_live() {
            return Err(EngineError::BadOrderState {
                order_id: id.raw(),
                reason: "terminal",
            });
        }
        if order.status == OrderStatus::CancelPending {
            return Ok(());
        }
        if order.modify_in_flight() {
            order.cancel_queued = true;
            return Ok(());
        }

        let (side, price, open) = (order.side, order.price, order.open_qty());
        let mut req = self.base_request();
        req.order_id = id.raw();
        req.price = price;
        req.qty = lots_to_wire(&self.spec, open);
        req.set_codes(
            RequestKind::CancelOrder,
            OrderKind::Limit,
            OrderDuration::Day,
            side,
            OffsetFlag::Open,
        );

        match self.pipe.send(req) {
            Ok(()) => {
                if let Some(order) = self.orders.get_mut(&id.raw()) {
                    order.status = OrderStatus::CancelPending;
                    order.updated_ns = req.ts_ns;
                }
                Ok(())
            }
            Err(e) => {
                self.count_reject(e.kind());
                Err(e)
            }
        }
    }

    /// Cancel every live order on this leg.
    pub fn cancel_all(&mut self) {
        let ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_live() && o.status != OrderStatus::CancelPending)
            .map(|o| o.id)
            .collect();
        for id in ids {
            if let Err(e) = self.cancel(id) {
                debug!(order = %id, error = %e, "cancel-all skip");
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound responses
    // ------------------------------------------------------------------

    /// Apply one router response. Pure state transition plus position
    /// update; the returned event tells the controller what changed.
    pub fn on_response(&mut self, resp: &ResponseRecord) -> LegEvent {
        let Some(kind) = resp.response_kind() else {
            warn!(raw = resp.kind, "unknown response kind, dropping");
            return LegEvent::None;
        };
        let id = OrderId(resp.order_id);
        let mut follow_up = FollowUp::None;
        let mut remove = false;
        let event;

        {
            let Some(order) = self.orders.get_mut(&resp.order_id) else {
                debug!(order = %id, ?kind, "response for unknown order, dropping");
                return LegEvent::None;
            };
            order.updated_ns = resp.ts_ns;
            // Any router response means the order reached the exchange.
            if kind != ResponseKind::NewReject {
                order.confirmed = true;
            }

            match kind {
                ResponseKind::NewConfirm => {
                    if order.status == OrderStatus::New {
                        order.status = OrderStatus::NewConfirm;
                        order.exchange_order_id = resp.exchange_order_id;
                        event = LegEvent::Accepted(id);
                    } else {
                        debug!(order = %id, status = ?order.status, "stale NEW_CONFIRM");
                        event = LegEvent::None;
                    }
                }

                ResponseKind::NewReject => {
                    warn!(
                        order = %id,
                        error = resp.error_code,
                        symbol = %self.spec.symbol,
                        "order rejected by router"
                    );
                    self.reject_count += 1;
                    self.last_error = Some(ErrorKind::OrderRejected);
                    remove = true;
                    event = LegEvent::Rejected(id);
                }

                ResponseKind::TradeConfirm => {
                    let wire_qty = wire_to_lots(&self.spec, resp.qty);
                    let open = order.open_qty();
                    let fill_qty = if wire_qty > open {
                        // Fill past open quantity: clamp and continue.
                        self.anomaly_count += 1;
                        warn!(
                            order = %id,
                            fill = wire_qty,
                            open,
                            "fill past open quantity, clamping"
                        );
                        open
                    } else {
                        wire_qty
                    };

                    order.filled_qty += fill_qty;
                    let completed = order.open_qty() == 0;
                    if completed {
                        order.status = OrderStatus::Traded;
                        remove = true;
                    }

                    let side = order.side;
                    let hit_type = order.hit_type;
                    let tag = order.tag;

                    if fill_qty > 0 {
                        self.position.apply_fill(side, resp.price, fill_qty);
                        self.fills_seen += 1;
                        let signed = side.sign() * fill_qty as i64;
                        if hit_type.is_aggressive() || tag == OrderTag::AggressiveHedge {
                            self.net_aggressive += signed;
                        } else {
                            self.net_passive += signed;
                        }
                    }

                    event = LegEvent::Fill(FillEvent {
                        order_id: id,
                        side,
                        price: resp.price,
                        qty: fill_qty,
                        hit_type,
                        tag,
                        completed,
                    });
                }

                ResponseKind::ModifyConfirm => match order.status {
                    OrderStatus::ModifyPending | OrderStatus::NewConfirm => {
                        order.status = OrderStatus::NewConfirm;
                        order.price = resp.price;
                        // Response quantity is the new open quantity.
                        let open = wire_to_lots(&self.spec, resp.qty);
                        order.total_qty = order.filled_qty + order.cancelled_qty + open;
                        if let Some((p, q)) = order.modify_next.take() {
                            follow_up = FollowUp::Modify(id, p, q);
                        } else if order.cancel_queued {
                            order.cancel_queued = false;
                            follow_up = FollowUp::Cancel(id);
                        }
                        event = LegEvent::ModifyApplied(id);
                    }
                    _ => {
                        debug!(order = %id, status = ?order.status, "stale MODIFY_CONFIRM");
                        event = LegEvent::None;
                    }
                },

                ResponseKind::ModifyReject => {
                    if order.status == OrderStatus::ModifyPending {
                        order.status = OrderStatus::NewConfirm;
                        order.modify_next = None;
                        if order.cancel_queued {
                            order.cancel_queued = false;
                            follow_up = FollowUp::Cancel(id);
                        }
                        event = LegEvent::ModifyReverted(id);
                    } else {
                        event = LegEvent::None;
                    }
                }

                ResponseKind::CancelConfirm => {
                    order.cancelled_qty += order.open_qty();
                    order.status = OrderStatus::CancelConfirm;
                    self.cancel_count += 1;
                    remove = true;
                    event = LegEvent::Cancelled(id);
                }

                ResponseKind::CancelReject => {
                    if order.status == OrderStatus::CancelPending {
                        order.status = OrderStatus::NewConfirm;
                    }
                    event = LegEvent::None;
                }
            }
        }

        if remove {
            self.orders.remove(&resp.order_id);
        }

        match follow_up {
            FollowUp::Modify(id, p, q) => {
                if let Err(e) = self.modify(id, p, q) {
                    debug!(order = %id, error = %e, "coalesced modify dropped");
                }
            }
            FollowUp::Cancel(id) => {
                if let Err(e) = self.cancel(id) {
                    debug!(order = %id, error = %e, "queued cancel dropped");
                }
            }
            FollowUp::None => {}
        }

        event
    }

    // ------------------------------------------------------------------
    // Controller queries
    // ------------------------------------------------------------------

    #[inline(always)]
    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    #[inline(always)]
    pub fn has_order(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id.raw())
    }

    /// Apply a reloaded position cap.
    pub fn set_max_size(&mut self, max_size: i64) {
        self.params.max_size = max_size;
    }

    #[inline(always)]
    pub fn position(&self) -> &PositionState {
        &self.position
    }

    /// Recompute unrealised PnL from a fresh marking price.
    pub fn mark(&mut self, price: f64) {
        self.position.mark(price);
    }

    #[inline(always)]
    pub fn net(&self) -> i64 {
        self.position.net()
    }

    #[inline(always)]
    pub fn net_passive(&self) -> i64 {
        self.net_passive
    }

    #[inline(always)]
    pub fn net_aggressive(&self) -> i64 {
        self.net_aggressive
    }

    /// Signed open quantity of router-confirmed aggressive orders.
    /// Orders still awaiting their first response are in flight, not
    /// open, and are excluded.
    pub fn pending_aggressive(&self) -> i64 {
        self.orders
            .values()
            .filter(|o| o.tag == OrderTag::AggressiveHedge && o.is_confirmed_open())
            .map(|o| o.side.sign() * o.open_qty() as i64)
            .sum()
    }

    /// Live aggressive orders (any status), oldest intent first.
    pub fn live_aggressive(&self) -> Vec<OrderId> {
        let mut ids: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| o.tag == OrderTag::AggressiveHedge && o.is_live())
            .collect();
        ids.sort_by_key(|o| o.id.raw());
        ids.into_iter().map(|o| o.id).collect()
    }

    /// The working passive quote on a side, if any.
    pub fn working_quote(&self, side: Side) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.tag == OrderTag::Quote && o.side == side && o.is_live())
    }

    pub fn has_working_quote(&self, side: Side) -> bool {
        self.working_quote(side).is_some()
    }

    /// Open working quantity on one side, in lots.
    pub fn open_qty(&self, side: Side) -> i64 {
        self.orders
            .values()
            .filter(|o| o.side == side && o.is_live())
            .map(|o| o.open_qty() as i64)
            .sum()
    }

    /// Open working notional on one side.
    pub fn open_notional(&self, side: Side) -> f64 {
        self.orders
            .values()
            .filter(|o| o.side == side && o.is_live())
            .map(|o| o.price * o.open_qty() as f64)
            .sum()
    }

    pub fn has_live_orders(&self) -> bool {
        self.orders.values().any(|o| o.is_live())
    }

    pub fn live_order_count(&self) -> usize {
        self.orders.values().filter(|o| o.is_live()).count()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Flat and nothing working: the squareoff target state.
    pub fn is_squared_off(&self) -> bool {
        self.position.is_flat() && !self.has_live_orders()
    }

    #[inline(always)]
    pub fn reject_count(&self) -> u32 {
        self.reject_count
    }

    #[inline(always)]
    pub fn cancel_count(&self) -> u32 {
        self.cancel_count
    }

    #[inline(always)]
    pub fn anomaly_count(&self) -> u32 {
        self.anomaly_count
    }

    #[inline(always)]
    pub fn orders_sent(&self) -> u64 {
        self.orders_sent
    }

    #[inline(always)]
    pub fn fills_seen(&self) -> u64 {
        self.fills_seen
    }

    #[inline(always)]
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }
}
