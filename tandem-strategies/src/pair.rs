//! Pair strategy controller
//!
//! Ties the spread model, the dynamic thresholds, two leg managers, and
//! the hedger into the pairs-trading loop:
//!
//! - leg-1 ticks refresh the deviation and thresholds and drive the
//!   passive quoting decisions (join the touch, chase the top, cancel on
//!   the remove condition);
//! - leg-2 ticks and every fill re-evaluate exposure and drive the
//!   aggressive hedger;
//! - risk caps, hedger exhaustion, external command, or session end
//!   escalate to squareoff: cancel everything, flatten both legs with
//!   marketable orders, stop.
//!
//! The host serialises every entry point through one mutex, so all state
//! here is plain.

use crate::hedger::{HedgePlan, Hedger};
use crate::spread::{SpreadAnalyzer, SpreadReading};
use crate::thresholds::{self, DerivedThresholds};
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::book::{validator, Instrument};
use tandem_core::config::{EngineConfig, ModelConfig, ThresholdSet};
use tandem_core::control::status::{LegStatus, SpreadStatus, ThresholdStatus};
use tandem_core::control::{Command, StatusSnapshot};
use tandem_core::core::{EngineState, ErrorKind, HitType, OrderId, OrderStatus, OrderTag, Side};
use tandem_core::host::pipe::{OrderIdAllocator, RequestPipe};
use tandem_core::host::{Strategy, TvarReader};
use tandem_core::ipc::records::{MdRecord, ResponseRecord, SYMBOL_LEN};
use tandem_core::ipc::encode_symbol;
use tandem_core::oms::{LegEvent, LegManager, LegParams};
use tandem_core::risk::RiskLimits;
use tandem_core::snapshot::SnapshotRow;
use tandem_core::utils::time;
use tracing::{debug, info, warn};

/// Flatten one leg's residual net with a marketable order at the touch.
fn flatten_leg(leg: &mut LegManager, book: &Instrument) {
    let net = leg.net();
    if net == 0 {
        return;
    }
    let side = if net > 0 { Side::Sell } else { Side::Buy };
    let top = match side {
        Side::Sell => book.best_bid(),
        Side::Buy => book.best_ask(),
    };
    let Some(top) = top else {
        return;
    };
    let price = book.round_to_tick(top);
    if let Err(e) = leg.send_new(
        side,
        price,
        net.unsigned_abs() as u32,
        HitType::Cross,
        OrderTag::AggressiveHedge,
    ) {
        debug!(symbol = %book.symbol(), error = %e, "flatten order not sent");
    }
}

/// The pairwise arbitrage controller
pub struct PairStrategy {
    strategy_id: i32,
    model_path: Option<PathBuf>,

    thresholds: ThresholdSet,
    risk: RiskLimits,

    book1: Instrument,
    book2: Instrument,
    symbol1: [u8; SYMBOL_LEN],
    symbol2: [u8; SYMBOL_LEN],

    leg1: LegManager,
    leg2: LegManager,

    analyzer: SpreadAnalyzer,
    hedger: Hedger,

    state: EngineState,
    last_reading: SpreadReading,
    derived: DerivedThresholds,
    tvar: TvarReader,

    /// The current aggressive chase order on leg 2, cancelled before a
    /// re-priced attempt goes out.
    chase_order: Option<OrderId>,

    pending_model: Option<ModelConfig>,
    squareoff_cancel_issued: bool,
    last_error: Option<ErrorKind>,

    ticks: u64,
    ytd_passive_seed: i64,
}

impl PairStrategy {
    pub fn new(
        cfg: &EngineConfig,
        day_start: SnapshotRow,
        model_path: Option<PathBuf>,
        tvar: TvarReader,
        alloc: Arc<OrderIdAllocator>,
        pipe: RequestPipe,
    ) -> Self {
        let t = cfg.model.thresholds;

        let leg1 = LegManager::new(
            cfg.leg1.clone(),
            LegParams {
                strategy_id: cfg.strategy_id,
                account: cfg.account.clone(),
                max_size: t.max_size,
                max_open_orders: cfg.max_open_orders,
                fee_per_lot: cfg.model.leg1_fee_per_lot,
            },
            Arc::clone(&alloc),
            pipe.clone(),
        );
        let leg2 = LegManager::new(
            cfg.leg2.clone(),
            LegParams {
                strategy_id: cfg.strategy_id,
                account: cfg.account.clone(),
                max_size: t.max_size,
                max_open_orders: cfg.max_open_orders,
                fee_per_lot: cfg.model.leg2_fee_per_lot,
            },
            alloc,
            pipe,
        );

        let mut analyzer = SpreadAnalyzer::new(cfg.model.ratio, t.alpha, t.avg_spread_away);
        analyzer.seed_mean(day_start.avg_px);

        if !day_start.leg1_symbol.is_empty() && day_start.leg1_symbol != cfg.leg1.symbol {
            warn!(
                snapshot = %day_start.leg1_symbol,
                configured = %cfg.leg1.symbol,
                "snapshot leg-1 symbol differs from configuration"
            );
        }

        let mut strategy = Self {
            strategy_id: cfg.strategy_id,
            model_path,
            thresholds: t,
            risk: cfg.model.risk,
            symbol1: encode_symbol(&cfg.leg1.symbol),
            symbol2: encode_symbol(&cfg.leg2.symbol),
            book1: Instrument::new(cfg.leg1.clone()),
            book2: Instrument::new(cfg.leg2.clone()),
            leg1,
            leg2,
            analyzer,
            hedger: Hedger::new(),
            state: EngineState::Init,
            last_reading: SpreadReading::default(),
            derived: DerivedThresholds::default(),
            tvar,
            chase_order: None,
            pending_model: None,
            squareoff_cancel_issued: false,
            last_error: None,
            ticks: 0,
            ytd_passive_seed: day_start.ytd_passive,
        };

        strategy.leg1.seed_carry(day_start.ytd_passive, 0);
        strategy.leg2.seed_carry(0, day_start.ytd_aggressive);
        strategy.state = EngineState::Running;
        info!(
            strategy = strategy.strategy_id,
            avg_px = day_start.avg_px,
            ytd1 = day_start.ytd_passive,
            ytd2 = day_start.ytd_aggressive,
            "pair controller restored, running"
        );
        strategy
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Residual directional risk across both legs, counting
    /// router-confirmed in-flight aggressive quantity.
    pub fn exposure(&self) -> i64 {
        self.leg1.net_passive() + self.leg2.net_aggressive() + self.leg2.pending_aggressive()
    }

    pub fn engine_state(&self) -> EngineState {
        self.state
    }

    pub fn last_reading(&self) -> SpreadReading {
        self.last_reading
    }

    pub fn derived_thresholds(&self) -> DerivedThresholds {
        self.derived
    }

    pub fn leg1(&self) -> &LegManager {
        &self.leg1
    }

    pub fn leg2(&self) -> &LegManager {
        &self.leg2
    }

    // ------------------------------------------------------------------
    // Tick handling
    // ------------------------------------------------------------------

    fn on_leg1_tick(&mut self, rec: &MdRecord, now_ms: u64) {
        self.apply_pending_model();

        if let Err(e) = validator::validate_on_grid(rec, self.book1.tick_size()) {
            debug!(error = %e, "leg1 tick dropped");
            return;
        }
        self.book1.apply(rec);
        self.ticks += 1;
        if let Some(mark) = self.book1.mark_price() {
            self.leg1.mark(mark);
        }
        if matches!(self.state, EngineState::Init | EngineState::Stopped) {
            return;
        }

        if let (Some(mid1), Some(mid2)) = (self.book1.mid(), self.book2.mid()) {
            let t_value = self.tvar.read();
            let active = self.state == EngineState::Active;
            self.last_reading = self.analyzer.observe(mid1, mid2, active, t_value);
        }
        self.derived = thresholds::derive(&self.thresholds, self.leg1.net_passive());

        if self.state == EngineState::Active {
            self.passive_side(Side::Buy);
            self.passive_side(Side::Sell);
        }
        self.check_risk();
        self.run_hedger(now_ms);
        self.drive_transitions(now_ms);
    }

    fn on_leg2_tick(&mut self, rec: &MdRecord, now_ms: u64) {
        self.apply_pending_model();

        if let Err(e) = validator::validate_on_grid(rec, self.book2.tick_size()) {
            debug!(error = %e, "leg2 tick dropped");
            return;
        }
        self.book2.apply(rec);
        self.ticks += 1;
        if let Some(mark) = self.book2.mark_price() {
            self.leg2.mark(mark);
        }
        if matches!(self.state, EngineState::Init | EngineState::Stopped) {
            return;
        }

        // No passive decisions on hedge-leg ticks; the hedger may need
        // to chase the moved price.
        self.check_risk();
        self.run_hedger(now_ms);
        self.drive_transitions(now_ms);
    }

    /// Passive quoting decision for one side, independently of the other:
    /// place on the place condition, chase the touch while working,
    /// cancel on the remove condition. Exact threshold ties do nothing.
    fn passive_side(&mut self, side: Side) {
        let (Some(bid), Some(ask)) = (self.book1.best_bid(), self.book1.best_ask()) else {
            return;
        };
        let tick = self.book1.tick_size();
        let improve = self.thresholds.improve;
        let dev = self.last_reading.deviation;
        let size = self.thresholds.size;

        let (target, hit, place, remove) = match side {
            Side::Buy => {
                let target = if improve { (bid + tick).min(ask - tick) } else { bid };
                let hit = if improve { HitType::Improve } else { HitType::Standard };
                (
                    target,
                    hit,
                    dev < -self.derived.bid_place,
                    dev > -self.derived.bid_remove,
                )
            }
            Side::Sell => {
                let target = if improve { (ask - tick).max(bid + tick) } else { ask };
                let hit = if improve { HitType::Improve } else { HitType::Standard };
                (
                    target,
                    hit,
                    dev > self.derived.ask_place,
                    dev < self.derived.ask_remove,
                )
            }
        };
        let target = self.book1.round_to_tick(target);

        match self
            .leg1
            .working_quote(side)
            .map(|o| (o.id, o.price, o.status, o.open_qty()))
        {
            None => {
                if place {
                    if let Err(e) = self.leg1.send_new(side, target, size, hit, OrderTag::Quote) {
                        debug!(%side, error = %e, "quote not placed");
                        self.last_error = Some(e.kind());
                    }
                }
            }
            Some((id, price, status, open)) => {
                if remove {
                    if let Err(e) = self.leg1.cancel(id) {
                        debug!(order = %id, error = %e, "quote cancel failed");
                    }
                } else if (price - target).abs() > 1e-9 && status == OrderStatus::NewConfirm {
                    // Own book moved: chase the new touch.
                    if let Err(e) = self.leg1.modify(id, target, open) {
                        debug!(order = %id, error = %e, "quote chase failed");
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Hedging and risk
    // ------------------------------------------------------------------

    fn run_hedger(&mut self, now_ms: u64) {
        if self.state != EngineState::Active {
            return;
        }
        let exposure = self.exposure();
        let has_working = !self.leg2.live_aggressive().is_empty();
        let plan = self.hedger.plan(
            exposure,
            has_working,
            self.book2.best_bid(),
            self.book2.best_ask(),
            self.book2.tick_size(),
            self.thresholds.slop,
            now_ms,
        );

        match plan {
            HedgePlan::Hold => {}
            HedgePlan::Order { side, price } => {
                // Retire the previous attempt before re-pricing.
                if let Some(prev) = self.chase_order.take() {
                    if self.leg2.has_order(prev) {
                        let _ = self.leg2.cancel(prev);
                    }
                }
                let qty = exposure.unsigned_abs() as u32;
                let price = self.book2.round_to_tick(price);
                match self
                    .leg2
                    .send_new(side, price, qty, HitType::Cross, OrderTag::AggressiveHedge)
                {
                    Ok(id) => self.chase_order = Some(id),
                    Err(e) => {
                        warn!(%side, qty, error = %e, "hedge order not sent");
                        let kind = e.kind();
                        self.last_error = Some(kind);
                        // A hedge that cannot reach the router leaves the
                        // book unhedged: fatal for the leg.
                        if kind == ErrorKind::QueueFull {
                            self.enter_squareoff("hedge send hit queue-full");
                        }
                    }
                }
            }
            HedgePlan::Squareoff => {
                self.enter_squareoff("hedger retry budget exhausted");
            }
        }
    }

    fn check_risk(&mut self) {
        if !matches!(
            self.state,
            EngineState::Running | EngineState::Active | EngineState::Deactivating
        ) {
            return;
        }
        if let Some(breach) = self.risk.check_pair(&self.leg1, &self.leg2) {
            warn!(?breach, "risk cap breached");
            self.last_error = Some(ErrorKind::RiskBreach);
            self.enter_squareoff("risk cap breached");
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn enter_squareoff(&mut self, reason: &str) {
        if matches!(self.state, EngineState::SquaringOff | EngineState::Stopped) {
            return;
        }
        warn!(reason, "entering squareoff");
        self.state = EngineState::SquaringOff;
        self.hedger.reset();
        self.chase_order = None;
        self.squareoff_cancel_issued = false;
        self.drive_squareoff(time::now_ms());
    }

    /// Squareoff progression: cancel everything once, wait until both
    /// order books are clear of our orders, then flatten residual nets
    /// with marketable orders; flat on both legs is STOPPED.
    fn drive_squareoff(&mut self, _now_ms: u64) {
        if self.state != EngineState::SquaringOff {
            return;
        }
        if !self.squareoff_cancel_issued {
            self.leg1.cancel_all();
            self.leg2.cancel_all();
            self.squareoff_cancel_issued = true;
        }
        if self.leg1.has_live_orders() || self.leg2.has_live_orders() {
            return;
        }
        if self.leg1.is_squared_off() && self.leg2.is_squared_off() {
            info!(strategy = self.strategy_id, "flat on both legs, stopped");
            self.state = EngineState::Stopped;
            return;
        }
        flatten_leg(&mut self.leg1, &self.book1);
        flatten_leg(&mut self.leg2, &self.book2);
    }

    /// Deactivation: pull the passive quotes, then rest in RUNNING with
    /// positions kept.
    fn drive_deactivate(&mut self) {
        if self.state != EngineState::Deactivating {
            return;
        }
        if self.leg1.working_quote(Side::Buy).is_none()
            && self.leg1.working_quote(Side::Sell).is_none()
        {
            info!("quotes pulled, back to running");
            self.state = EngineState::Running;
        }
    }

    fn drive_transitions(&mut self, now_ms: u64) {
        match self.state {
            EngineState::SquaringOff => self.drive_squareoff(now_ms),
            EngineState::Deactivating => self.drive_deactivate(),
            _ => {}
        }
    }

    fn apply_pending_model(&mut self) {
        if let Some(model) = self.pending_model.take() {
            self.thresholds = model.thresholds;
            self.risk = model.risk;
            self.leg1.set_max_size(model.thresholds.max_size);
            self.leg2.set_max_size(model.thresholds.max_size);
            self.analyzer.reconfigure(
                model.ratio,
                model.thresholds.alpha,
                model.thresholds.avg_spread_away,
            );
            info!("model parameters reloaded");
        }
    }

    fn handle_response_inner(&mut self, resp: &ResponseRecord) {
        let id = OrderId(resp.order_id);
        let now_ms = if resp.ts_ns > 0 {
            resp.ts_ns / 1_000_000
        } else {
            time::now_ms()
        };

        let event = if self.leg1.has_order(id) {
            self.leg1.on_response(resp)
        } else if self.leg2.has_order(id) {
            self.leg2.on_response(resp)
        } else {
            debug!(order = %id, "response for unknown order, dropping");
            return;
        };

        match event {
            LegEvent::Fill(fill) => {
                // PnL is recomputed on every fill.
                if let Some(mark) = self.book1.mark_price() {
                    self.leg1.mark(mark);
                }
                if let Some(mark) = self.book2.mark_price() {
                    self.leg2.mark(mark);
                }
                if fill.completed && Some(fill.order_id) == self.chase_order {
                    self.chase_order = None;
                }
                self.check_risk();
                self.run_hedger(now_ms);
            }
            LegEvent::Rejected(rid) | LegEvent::Cancelled(rid) => {
                if Some(rid) == self.chase_order {
                    self.chase_order = None;
                }
                self.check_risk();
                self.run_hedger(now_ms);
            }
            _ => {}
        }

        self.drive_transitions(now_ms);
    }
}

impl Strategy for PairStrategy {
    fn on_market_data(&mut self, rec: &MdRecord) {
        let now_ms = if rec.local_ts_ns > 0 {
            rec.local_ts_ns / 1_000_000
        } else {
            time::now_ms()
        };
        if rec.symbol == self.symbol1 {
            self.on_leg1_tick(rec, now_ms);
        } else if rec.symbol == self.symbol2 {
            self.on_leg2_tick(rec, now_ms);
        }
    }

    fn on_response(&mut self, resp: &ResponseRecord) {
        self.handle_response_inner(resp);
    }

    fn on_timer(&mut self, now_ms: u64) {
        self.apply_pending_model();
        if matches!(
            self.state,
            EngineState::Running | EngineState::Active | EngineState::Deactivating
        ) {
            self.check_risk();
        }
        self.run_hedger(now_ms);
        self.drive_transitions(now_ms);
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Activate => {
                if self.state == EngineState::Running {
                    info!("activated");
                    self.state = EngineState::Active;
                } else {
                    warn!(state = %self.state, "activate ignored");
                }
            }
            Command::Deactivate => {
                if self.state == EngineState::Active {
                    info!("deactivating: pulling quotes, keeping positions");
                    self.state = EngineState::Deactivating;
                    if let Some(id) = self.leg1.working_quote(Side::Buy).map(|o| o.id) {
                        let _ = self.leg1.cancel(id);
                    }
                    if let Some(id) = self.leg1.working_quote(Side::Sell).map(|o| o.id) {
                        let _ = self.leg1.cancel(id);
                    }
                    self.drive_deactivate();
                } else {
                    warn!(state = %self.state, "deactivate ignored");
                }
            }
            Command::Squareoff => self.enter_squareoff("external command"),
            Command::ReloadThresholds => match &self.model_path {
                Some(path) => match EngineConfig::load_model(path) {
                    Ok(model) => {
                        info!(path = %path.display(), "model staged for next tick");
                        self.pending_model = Some(model);
                    }
                    Err(e) => warn!(error = %e, "model reload failed, keeping current"),
                },
                None => warn!("reload requested but no model path configured"),
            },
        }
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn status(&self) -> StatusSnapshot {
        let r = self.last_reading;
        let d = self.derived;
        StatusSnapshot {
            strategy_id: self.strategy_id,
            state: self.state,
            spread: SpreadStatus {
                current: r.current,
                avg_ori: r.avg_ori,
                avg: r.avg,
                std_dev: r.std_dev,
                deviation: r.deviation,
                t_value: r.t_value,
            },
            thresholds: ThresholdStatus {
                bid_place: d.bid_place,
                ask_place: d.ask_place,
                bid_remove: d.bid_remove,
                ask_remove: d.ask_remove,
            },
            exposure: self.exposure(),
            legs: vec![
                LegStatus::from_leg(&self.leg1),
                LegStatus::from_leg(&self.leg2),
            ],
            last_error: self
                .last_error
                .or(self.leg1.last_error())
                .or(self.leg2.last_error()),
            ticks: self.ticks,
            timestamp_ms: time::now_ms(),
            host: None,
        }
    }

    fn snapshot_row(&self) -> SnapshotRow {
        SnapshotRow {
            strategy_id: self.strategy_id,
            today_net: self.leg1.net_passive() - self.ytd_passive_seed,
            avg_px: self.analyzer.avg_ori(),
            leg1_symbol: self.book1.symbol().to_string(),
            leg2_symbol: self.book2.symbol().to_string(),
            ytd_passive: self.leg1.net_passive(),
            ytd_aggressive: self.leg2.net_aggressive(),
        }
    }
}
