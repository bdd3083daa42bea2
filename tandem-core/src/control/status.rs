//! Externally visible strategy status
//!
//! The controller produces a [`StatusSnapshot`] on the timer thread; the
//! control-plane server serialises it for `GET /status`. Everything here
//! is cold path.

use crate::core::{EngineState, ErrorKind, OrderId, OrderStatus, OrderTag, Side};
use crate::oms::LegManager;
use serde::Serialize;

/// One working order, summarised
#[derive(Debug, Clone, Serialize)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub side: Side,
    pub price: f64,
    pub open_qty: u32,
    pub status: OrderStatus,
    pub tag: OrderTag,
}

/// One leg's positions, PnL, and order-flow counters
#[derive(Debug, Clone, Serialize)]
pub struct LegStatus {
    pub symbol: String,
    pub net: i64,
    pub net_passive: i64,
    pub net_aggressive: i64,
    pub long_qty: i64,
    pub short_qty: i64,
    pub avg_long: f64,
    pub avg_short: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub fees_paid: f64,
    pub drawdown: f64,
    pub open_buy_qty: i64,
    pub open_sell_qty: i64,
    pub open_buy_notional: f64,
    pub open_sell_notional: f64,
    pub reject_count: u32,
    pub cancel_count: u32,
    pub orders_sent: u64,
    pub fills_seen: u64,
    pub working_orders: Vec<OrderRow>,
}

impl LegStatus {
    pub fn from_leg(leg: &LegManager) -> Self {
        let pos = leg.position();
        let mut working_orders: Vec<OrderRow> = leg
            .orders()
            .filter(|o| o.is_live())
            .map(|o| OrderRow {
                order_id: o.id,
                side: o.side,
                price: o.price,
                open_qty: o.open_qty(),
                status: o.status,
                tag: o.tag,
            })
            .collect();
        working_orders.sort_by_key(|o| o.order_id.raw());

        Self {
            symbol: leg.spec().symbol.clone(),
            net: pos.net(),
            net_passive: leg.net_passive(),
            net_aggressive: leg.net_aggressive(),
            long_qty: pos.long_qty(),
            short_qty: pos.short_qty(),
            avg_long: pos.avg_long(),
            avg_short: pos.avg_short(),
            realized_pnl: pos.realized(),
            unrealized_pnl: pos.unrealized(),
            fees_paid: pos.fees_paid(),
            drawdown: pos.drawdown(),
            open_buy_qty: leg.open_qty(Side::Buy),
            open_sell_qty: leg.open_qty(Side::Sell),
            open_buy_notional: leg.open_notional(Side::Buy),
            open_sell_notional: leg.open_notional(Side::Sell),
            reject_count: leg.reject_count(),
            cancel_count: leg.cancel_count(),
            orders_sent: leg.orders_sent(),
            fills_seen: leg.fills_seen(),
            working_orders,
        }
    }
}

/// Spread statistics at the last tick
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SpreadStatus {
    pub current: f64,
    pub avg_ori: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub deviation: f64,
    pub t_value: f64,
}

/// Derived thresholds at the last tick
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThresholdStatus {
    pub bid_place: f64,
    pub ask_place: f64,
    pub bid_remove: f64,
    pub ask_remove: f64,
}

/// Queue-side counters maintained by the host threads
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HostStatus {
    pub md_records: u64,
    pub responses: u64,
    pub foreign_responses_dropped: u64,
    pub empty_polls: u64,
    pub requests_staged: u64,
    pub requests_written: u64,
    pub stage_full_events: u64,
}

/// The full `/status` document
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub strategy_id: i32,
    pub state: EngineState,
    pub spread: SpreadStatus,
    pub thresholds: ThresholdStatus,
    pub exposure: i64,
    pub legs: Vec<LegStatus>,
    pub last_error: Option<ErrorKind>,
    pub ticks: u64,
    pub timestamp_ms: u64,
    pub host: Option<HostStatus>,
}

impl StatusSnapshot {
    /// Placeholder before the first timer emission.
    pub fn empty(strategy_id: i32) -> Self {
        Self {
            strategy_id,
            state: EngineState::Init,
            spread: SpreadStatus::default(),
            thresholds: ThresholdStatus::default(),
            exposure: 0,
            legs: Vec::new(),
            last_error: None,
            ticks: 0,
            timestamp_ms: 0,
            host: None,
        }
    }
}
