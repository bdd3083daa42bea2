//! Strategy host
//!
//! Owns the process side of the IPC contract: attaches the three ring
//! queues and the scalar cells, claims a client-id, spawns the polling
//! threads, and routes records to registered strategies.
//!
//! Threads:
//! - **md**: drains the market-data ring, routes by symbol;
//! - **resp**: drains the response ring, drops foreign order-ids, routes
//!   by strategy-id (order-id map as fallback);
//! - **writer**: drains the process-local staging buffer into the
//!   request ring with a bounded retry;
//! - **timer**: applies control commands, drives `on_timer`, publishes
//!   status/metrics, persists the day snapshot.
//!
//! All strategy mutation is serialised through the per-strategy mutex;
//! reader threads spin briefly on an empty queue, then yield.

pub mod kill_switch;
pub mod pipe;

pub use kill_switch::KillSwitch;
pub use pipe::{OrderIdAllocator, PipeStats, RequestPipe};

use crate::config::EngineConfig;
use crate::control::status::HostStatus;
use crate::control::{Command, CommandQueue, Metrics, StatusSnapshot};
use crate::core::{EngineError, EngineState, OrderId, RequestKind, ResponseKind};
use crate::ipc::records::SYMBOL_LEN;
use crate::ipc::{
    cell_path, encode_symbol, queue_path, ClientStore, MdRecord, RequestRecord, ResponseRecord,
    ShmRing, TvarCell,
};
use crate::snapshot::{self, SnapshotRow};
use crate::utils::time;
use crossbeam_utils::CachePadded;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Spin this many empty polls before yielding to the scheduler.
const SPIN_BEFORE_YIELD: u32 = 256;

/// Writer-side bound on consecutive failed ring pushes before the kill
/// switch trips.
const WRITER_RING_RETRIES: u32 = 100_000;

/// Save the snapshot every N timer ticks (plus once at shutdown).
const SNAPSHOT_EVERY_TICKS: u64 = 20;

/// Capability interface every hosted strategy implements
///
/// The host guarantees one event at a time per strategy (the mutex), and
/// FIFO application per queue.
pub trait Strategy: Send + 'static {
    fn on_market_data(&mut self, rec: &MdRecord);
    fn on_response(&mut self, resp: &ResponseRecord);
    fn on_timer(&mut self, now_ms: u64);
    fn handle_command(&mut self, cmd: Command);
    fn state(&self) -> EngineState;
    fn status(&self) -> StatusSnapshot;
    fn snapshot_row(&self) -> SnapshotRow;
}

/// Read handle on the t-var cell
///
/// A missing cell (attach failure at start) is logged once and reads as
/// a permanent zero offset.
#[derive(Clone)]
pub struct TvarReader {
    cell: Option<Arc<TvarCell>>,
}

impl TvarReader {
    pub fn disabled() -> Self {
        Self { cell: None }
    }

    #[inline]
    pub fn read(&self) -> f64 {
        match &self.cell {
            Some(cell) => cell.read(),
            None => 0.0,
        }
    }
}

/// Host wiring derived from the engine configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub md_path: PathBuf,
    pub request_path: PathBuf,
    pub response_path: PathBuf,
    pub client_store_path: PathBuf,
    pub tvar_path: Option<PathBuf>,
    pub md_capacity: u32,
    pub request_capacity: u32,
    pub response_capacity: u32,
    pub stage_capacity: usize,
    pub send_retries: u32,
    pub timer_interval: Duration,
    pub snapshot_path: PathBuf,
    pub cpu_core: Option<usize>,
}

impl HostConfig {
    pub fn from_engine(cfg: &EngineConfig, cpu_core: Option<usize>) -> Self {
        Self {
            md_path: queue_path(cfg.ipc.md_key),
            request_path: queue_path(cfg.ipc.request_key),
            response_path: queue_path(cfg.ipc.response_key),
            client_store_path: cell_path(cfg.ipc.client_store_key),
            tvar_path: cfg.ipc.tvar_key.map(cell_path),
            md_capacity: cfg.ipc.md_capacity,
            request_capacity: cfg.ipc.request_capacity,
            response_capacity: cfg.ipc.response_capacity,
            stage_capacity: cfg.ipc.stage_capacity,
            send_retries: cfg.ipc.send_retries,
            timer_interval: Duration::from_millis(500),
            snapshot_path: cfg.snapshot_path.clone(),
            cpu_core,
        }
    }
}

/// Queue-side counters, padded so the reader threads' hot increments do
/// not share cache lines.
#[derive(Debug, Default)]
pub struct HostStats {
    pub md_records: CachePadded<AtomicU64>,
    pub responses: CachePadded<AtomicU64>,
    pub foreign_responses: CachePadded<AtomicU64>,
    pub empty_polls: CachePadded<AtomicU64>,
}

impl HostStats {
    fn to_status(&self, pipe: &PipeStats) -> HostStatus {
        HostStatus {
            md_records: self.md_records.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            foreign_responses_dropped: self.foreign_responses.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            requests_staged: pipe.staged.load(Ordering::Relaxed),
            requests_written: pipe.drained.load(Ordering::Relaxed),
            stage_full_events: pipe.stage_full.load(Ordering::Relaxed),
        }
    }
}

/// One registered strategy
pub struct StrategyEntry<S: Strategy> {
    pub strategy: Arc<Mutex<S>>,
    pub strategy_id: i32,
    /// Symbols whose market data this strategy receives.
    pub symbols: Vec<String>,
}

/// The process host: rings, cells, id allocation, polling threads
pub struct StrategyHost {
    cfg: HostConfig,
    md_in: Arc<ShmRing<MdRecord>>,
    req_out: Arc<ShmRing<RequestRecord>>,
    resp_in: Arc<ShmRing<ResponseRecord>>,
    pipe: RequestPipe,
    alloc: Arc<OrderIdAllocator>,
    tvar: TvarReader,
    stats: Arc<HostStats>,
    kill: KillSwitch,
}

impl StrategyHost {
    /// Attach every shared-memory object and claim a client-id.
    /// Any failure here is fatal: the process exits non-zero.
    pub fn attach(cfg: HostConfig, kill: KillSwitch) -> Result<Self, EngineError> {
        let md_in = Arc::new(ShmRing::open_or_create(&cfg.md_path, cfg.md_capacity)?);
        let req_out = Arc::new(ShmRing::open_or_create(&cfg.request_path, cfg.request_capacity)?);
        let resp_in = Arc::new(ShmRing::open_or_create(&cfg.response_path, cfg.response_capacity)?);

        let client_store = ClientStore::attach(&cfg.client_store_path)?;
        let client_id = client_store.next_client_id();
        info!(client_id, "claimed client-id");

        let tvar = match &cfg.tvar_path {
            Some(path) => match TvarCell::attach(path) {
                Ok(cell) => TvarReader {
                    cell: Some(Arc::new(cell)),
                },
                Err(e) => {
                    // Substitute zero for the life of the process.
                    warn!(error = %e, "t-var cell unavailable, offset pinned to zero");
                    TvarReader::disabled()
                }
            },
            None => TvarReader::disabled(),
        };

        let pipe = RequestPipe::new(cfg.stage_capacity, cfg.send_retries);

        Ok(Self {
            cfg,
            md_in,
            req_out,
            resp_in,
            pipe,
            alloc: Arc::new(OrderIdAllocator::new(client_id)),
            tvar,
            stats: Arc::new(HostStats::default()),
            kill,
        })
    }

    pub fn pipe(&self) -> RequestPipe {
        self.pipe.clone()
    }

    pub fn allocator(&self) -> Arc<OrderIdAllocator> {
        Arc::clone(&self.alloc)
    }

    pub fn tvar(&self) -> TvarReader {
        self.tvar.clone()
    }

    pub fn client_id(&self) -> u32 {
        self.alloc.client_id()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    /// Run the polling threads until the lead strategy reaches STOPPED
    /// (or the kill switch forces it there). Blocks the caller.
    pub fn run<S: Strategy>(
        self,
        entries: Vec<StrategyEntry<S>>,
        commands: CommandQueue,
        status: Arc<RwLock<StatusSnapshot>>,
        metrics: Arc<Metrics>,
    ) -> Result<(), EngineError> {
        if entries.is_empty() {
            return Err(EngineError::IpcFatal {
                detail: "no strategies registered".into(),
            });
        }

        let strategies: Arc<Vec<Arc<Mutex<S>>>> =
            Arc::new(entries.iter().map(|e| Arc::clone(&e.strategy)).collect());

        // symbol -> indices of interested strategies
        let symbol_routes: Arc<DashMap<[u8; SYMBOL_LEN], Vec<usize>>> = Arc::new(DashMap::new());
        // strategy-id -> index (read-only after build)
        let mut ids = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            ids.insert(entry.strategy_id, i);
            for sym in &entry.symbols {
                symbol_routes
                    .entry(encode_symbol(sym))
                    .or_default()
                    .push(i);
            }
        }
        let strategy_ids: Arc<HashMap<i32, usize>> = Arc::new(ids);
        // order-id -> index, kept by the writer thread for responses
        // whose strategy-id field is not echoed by the router
        let order_routes: Arc<DashMap<u32, usize>> = Arc::new(DashMap::new());

        let running = Arc::new(AtomicBool::new(true));

        // --- market-data reader -----------------------------------------
        let md_thread = {
            let running = Arc::clone(&running);
            let ring = Arc::clone(&self.md_in);
            let routes = Arc::clone(&symbol_routes);
            let strategies = Arc::clone(&strategies);
            let stats = Arc::clone(&self.stats);
            let cpu_core = self.cfg.cpu_core;
            std::thread::Builder::new()
                .name("md-reader".to_string())
                .spawn(move || {
                    if let Some(core) = cpu_core {
                        if crate::perf::pin_to_core(core) {
                            info!(core, "md reader pinned");
                        } else {
                            warn!(core, "md reader pin failed");
                        }
                    }
                    let mut empty = 0u32;
                    while running.load(Ordering::Relaxed) {
                        match ring.try_pop() {
                            Some(rec) => {
                                empty = 0;
                                stats.md_records.fetch_add(1, Ordering::Relaxed);
                                if let Some(targets) = routes.get(&rec.symbol) {
                                    for &i in targets.value() {
                                        strategies[i].lock().on_market_data(&rec);
                                    }
                                }
                            }
                            None => {
                                stats.empty_polls.fetch_add(1, Ordering::Relaxed);
                                empty = empty.saturating_add(1);
                                if empty < SPIN_BEFORE_YIELD {
                                    std::hint::spin_loop();
                                } else {
                                    std::thread::yield_now();
                                }
                            }
                        }
                    }
                })
                .expect("spawn md-reader")
        };

        // --- response reader --------------------------------------------
        let resp_thread = {
            let running = Arc::clone(&running);
            let ring = Arc::clone(&self.resp_in);
            let strategies = Arc::clone(&strategies);
            let strategy_ids = Arc::clone(&strategy_ids);
            let order_routes = Arc::clone(&order_routes);
            let alloc = Arc::clone(&self.alloc);
            let stats = Arc::clone(&self.stats);
            std::thread::Builder::new()
                .name("resp-reader".to_string())
                .spawn(move || {
                    let mut empty = 0u32;
                    while running.load(Ordering::Relaxed) {
                        match ring.try_pop() {
                            Some(resp) => {
                                empty = 0;
                                // Foreign namespace: another process owns it.
                                if !alloc.owns(OrderId(resp.order_id)) {
                                    stats.foreign_responses.fetch_add(1, Ordering::Relaxed);
                                    continue;
                                }
                                stats.responses.fetch_add(1, Ordering::Relaxed);

                                let idx = strategy_ids
                                    .get(&resp.strategy_id)
                                    .copied()
                                    .or_else(|| order_routes.get(&resp.order_id).map(|e| *e.value()));
                                let Some(idx) = idx else {
                                    stats.foreign_responses.fetch_add(1, Ordering::Relaxed);
                                    continue;
                                };

                                strategies[idx].lock().on_response(&resp);

                                // Terminal rejects/cancels retire the route.
                                if matches!(
                                    resp.response_kind(),
                                    Some(ResponseKind::NewReject | ResponseKind::CancelConfirm)
                                ) {
                                    order_routes.remove(&resp.order_id);
                                }
                            }
                            None => {
                                empty = empty.saturating_add(1);
                                if empty < SPIN_BEFORE_YIELD {
                                    std::hint::spin_loop();
                                } else {
                                    std::thread::yield_now();
                                }
                            }
                        }
                    }
                })
                .expect("spawn resp-reader")
        };

        // --- request writer ---------------------------------------------
        let writer_thread = {
            let running = Arc::clone(&running);
            let ring = Arc::clone(&self.req_out);
            let pipe = self.pipe.clone();
            let strategy_ids = Arc::clone(&strategy_ids);
            let order_routes = Arc::clone(&order_routes);
            let kill = self.kill.clone();
            std::thread::Builder::new()
                .name("req-writer".to_string())
                .spawn(move || {
                    let mut empty = 0u32;
                    loop {
                        match pipe.drain_one() {
                            Some(req) => {
                                empty = 0;
                                if req.kind == RequestKind::NewOrder as u8 {
                                    if let Some(&idx) = strategy_ids.get(&req.strategy_id) {
                                        order_routes.insert(req.order_id, idx);
                                    }
                                }

                                let mut attempts = 0u32;
                                loop {
                                    match ring.try_push(&req) {
                                        Ok(()) => break,
                                        Err(_) => {
                                            pipe.note_ring_retry();
                                            attempts += 1;
                                            if attempts >= WRITER_RING_RETRIES {
                                                error!(
                                                    order_id = req.order_id,
                                                    "request ring full past retry budget, dropping"
                                                );
                                                kill.trip("request ring full");
                                                break;
                                            }
                                            if attempts < SPIN_BEFORE_YIELD {
                                                std::hint::spin_loop();
                                            } else {
                                                std::thread::yield_now();
                                            }
                                        }
                                    }
                                }
                            }
                            None => {
                                // Drain fully before honouring shutdown.
                                if !running.load(Ordering::Relaxed) && pipe.is_empty() {
                                    break;
                                }
                                empty = empty.saturating_add(1);
                                if empty < SPIN_BEFORE_YIELD {
                                    std::hint::spin_loop();
                                } else {
                                    std::thread::yield_now();
                                }
                            }
                        }
                    }
                })
                .expect("spawn req-writer")
        };

        // --- timer / control --------------------------------------------
        let timer_thread = {
            let running = Arc::clone(&running);
            let strategies = Arc::clone(&strategies);
            let pipe = self.pipe.clone();
            let stats = Arc::clone(&self.stats);
            let kill = self.kill.clone();
            let interval = self.cfg.timer_interval;
            let snapshot_path = self.cfg.snapshot_path.clone();
            std::thread::Builder::new()
                .name("timer".to_string())
                .spawn(move || {
                    let mut kill_escalated = false;
                    let mut tick = 0u64;
                    loop {
                        std::thread::sleep(interval);
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        tick += 1;

                        while let Some(cmd) = commands.pop() {
                            for s in strategies.iter() {
                                s.lock().handle_command(cmd);
                            }
                        }

                        if kill.is_tripped() && !kill_escalated {
                            kill_escalated = true;
                            for s in strategies.iter() {
                                s.lock().handle_command(Command::Squareoff);
                            }
                        }

                        let now = time::now_ms();
                        for s in strategies.iter() {
                            s.lock().on_timer(now);
                        }

                        let (mut snap, state, row) = {
                            let lead = strategies[0].lock();
                            (lead.status(), lead.state(), lead.snapshot_row())
                        };
                        snap.host = Some(stats.to_status(pipe.stats()));
                        metrics.update_from(&snap);
                        *status.write() = snap;

                        let stopping = state == EngineState::Stopped;
                        if tick % SNAPSHOT_EVERY_TICKS == 0 || stopping {
                            if let Err(e) = snapshot::save(&snapshot_path, &row) {
                                warn!(error = %e, "periodic snapshot save failed");
                            }
                        }

                        if stopping {
                            info!("lead strategy stopped, shutting host down");
                            running.store(false, Ordering::Relaxed);
                            break;
                        }
                    }
                })
                .expect("spawn timer")
        };

        timer_thread.join().ok();
        md_thread.join().ok();
        resp_thread.join().ok();
        writer_thread.join().ok();

        // Final snapshot for every strategy; save failure is logged but
        // never blocks exit.
        for entry in &entries {
            let row = entry.strategy.lock().snapshot_row();
            if let Err(e) = snapshot::save(&self.cfg.snapshot_path, &row) {
                warn!(strategy = entry.strategy_id, error = %e, "final snapshot save failed");
            }
        }

        info!("host drained and detached");
        Ok(())
    }
}
