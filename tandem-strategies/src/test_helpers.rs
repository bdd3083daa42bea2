//! Test helpers for driving the pair controller without shared memory
//!
//! Records are fed straight into the strategy's entry points and the
//! staged requests inspected through the request pipe, so scenario tests
//! exercise exactly the code the host threads would.

use crate::pair::PairStrategy;
use std::sync::Arc;
use tandem_core::config::{
    ControlConfig, EngineConfig, IpcConfig, ModelConfig, ThresholdSet,
};
use tandem_core::core::{RequestKind, ResponseKind, Side};
use tandem_core::book::InstrumentSpec;
use tandem_core::host::pipe::{OrderIdAllocator, RequestPipe};
use tandem_core::host::{Strategy, TvarReader};
use tandem_core::ipc::records::{MdRecord, RequestRecord, ResponseRecord, WireLevel};
use tandem_core::ipc::encode_symbol;
use tandem_core::risk::RiskLimits;
use tandem_core::snapshot::SnapshotRow;

pub const LEG1: &str = "ag2603";
pub const LEG2: &str = "ag2605";
pub const STRATEGY_ID: i32 = 92201;

pub fn instrument(symbol: &str, token: u32, expiry: u32) -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol.to_string(),
        exchange: 1,
        token,
        tick_size: 1.0,
        lot_size: 1,
        multiplier: 1.0,
        price_multiplier: 1.0,
        send_in_lots: true,
        expiry,
    }
}

/// Baseline engine configuration: 1-tick grids, unit multiplier, small
/// spread window so tests can warm it quickly.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        strategy_id: STRATEGY_ID,
        account: "SIM1".to_string(),
        ipc: IpcConfig {
            md_key: 1,
            request_key: 2,
            response_key: 3,
            client_store_key: 4,
            tvar_key: None,
            md_capacity: 1024,
            request_capacity: 1024,
            response_capacity: 1024,
            stage_capacity: 256,
            send_retries: 2,
        },
        control: ControlConfig::default(),
        snapshot_path: "/tmp/tandem-test-day.txt".into(),
        leg1: instrument(LEG1, 4101, 20260320),
        leg2: instrument(LEG2, 4102, 20260515),
        model: ModelConfig {
            thresholds: ThresholdSet {
                begin_place: 2.0,
                long_place: 3.5,
                short_place: 0.5,
                begin_remove: 1.0,
                long_remove: 2.0,
                short_remove: 0.2,
                size: 10,
                max_size: 100,
                alpha: 0.01,
                slop: 5,
                avg_spread_away: 4,
                improve: false,
            },
            risk: RiskLimits::default(),
            ratio: 1.0,
            leg1_fee_per_lot: 0.0,
            leg2_fee_per_lot: 0.0,
        },
        max_open_orders: 16,
    }
}

/// A one-level market-data record on both sides.
pub fn md_record(symbol: &str, bid: f64, ask: f64, ts_ms: u64) -> MdRecord {
    let mut rec = MdRecord::zeroed();
    rec.symbol = encode_symbol(symbol);
    rec.bids[0] = WireLevel {
        price: bid,
        qty: 50,
        orders: 3,
    };
    rec.asks[0] = WireLevel {
        price: ask,
        qty: 50,
        orders: 3,
    };
    rec.bid_depth = 1;
    rec.ask_depth = 1;
    rec.exchange_ts_ns = ts_ms * 1_000_000;
    rec.local_ts_ns = ts_ms * 1_000_000;
    rec
}

pub fn response(order_id: u32, kind: ResponseKind, price: f64, qty: u32, ts_ms: u64) -> ResponseRecord {
    let mut r = ResponseRecord::zeroed();
    r.order_id = order_id;
    r.kind = kind as u8;
    r.price = price;
    r.qty = qty;
    r.ts_ns = ts_ms * 1_000_000;
    r.strategy_id = STRATEGY_ID;
    r
}

/// Strategy plus the staged-request tap
pub struct PairFixture {
    pub strategy: PairStrategy,
    pub pipe: RequestPipe,
}

impl PairFixture {
    pub fn tick(&mut self, symbol: &str, bid: f64, ask: f64, ts_ms: u64) {
        self.strategy
            .on_market_data(&md_record(symbol, bid, ask, ts_ms));
    }

    pub fn respond(&mut self, order_id: u32, kind: ResponseKind, price: f64, qty: u32, ts_ms: u64) {
        self.strategy
            .on_response(&response(order_id, kind, price, qty, ts_ms));
    }

    /// NEW_CONFIRM then a full TRADE_CONFIRM for one order.
    pub fn confirm_and_fill(&mut self, order_id: u32, price: f64, qty: u32, ts_ms: u64) {
        self.respond(order_id, ResponseKind::NewConfirm, price, qty, ts_ms);
        self.respond(order_id, ResponseKind::TradeConfirm, price, qty, ts_ms);
    }

    /// Take every staged request out of the pipe.
    pub fn drain_requests(&self) -> Vec<RequestRecord> {
        let mut out = Vec::new();
        while let Some(req) = self.pipe.drain_one() {
            out.push(req);
        }
        out
    }

    /// Fill leg-2's book, warm the spread window to a stable state
    /// (spreads alternating one point around `base_spread`), and leave
    /// leg-1 quoted around `base_spread + leg2_mid`.
    pub fn warm(&mut self, base_spread: f64, start_ms: u64) -> u64 {
        let mut ts = start_ms;
        self.tick(LEG2, 50.0, 51.0, ts);
        let leg2_mid = 50.5;
        for i in 0..4 {
            ts += 100;
            let offset = if i % 2 == 0 { 1.0 } else { -1.0 };
            let mid1 = base_spread + leg2_mid + offset;
            self.tick(LEG1, mid1 - 0.5, mid1 + 0.5, ts);
        }
        ts
    }
}

pub fn pair_fixture() -> PairFixture {
    pair_fixture_with(engine_config(), SnapshotRow::empty(STRATEGY_ID))
}

pub fn pair_fixture_with(cfg: EngineConfig, day_start: SnapshotRow) -> PairFixture {
    let pipe = RequestPipe::new(cfg.ipc.stage_capacity, cfg.ipc.send_retries);
    let alloc = Arc::new(OrderIdAllocator::new(1));
    let strategy = PairStrategy::new(
        &cfg,
        day_start,
        None,
        TvarReader::disabled(),
        alloc,
        pipe.clone(),
    );
    PairFixture { strategy, pipe }
}

/// Request predicates used by the scenario assertions.
pub fn is_new_order(req: &RequestRecord) -> bool {
    req.kind == RequestKind::NewOrder as u8
}

pub fn is_cancel(req: &RequestRecord) -> bool {
    req.kind == RequestKind::CancelOrder as u8
}

pub fn side_of(req: &RequestRecord) -> Option<Side> {
    Side::from_wire(req.side)
}
