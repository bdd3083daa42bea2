//! Host integration: rings in, routing, writer out, lifecycle
//!
//! Exercises the real polling threads against file-backed segments: an
//! external producer pushes market data and responses, the hosted
//! strategy stages a request, and a squareoff command winds the host
//! down through the timer thread.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tandem_core::control::{Command, CommandQueue, Metrics, StatusSnapshot};
use tandem_core::core::{EngineState, ResponseKind};
use tandem_core::host::{
    HostConfig, KillSwitch, RequestPipe, Strategy, StrategyEntry, StrategyHost,
};
use tandem_core::ipc::{
    encode_symbol, MdRecord, RequestRecord, ResponseRecord, ShmRing,
};
use tandem_core::snapshot::SnapshotRow;

struct ProbeStrategy {
    pipe: RequestPipe,
    md_seen: u64,
    resp_seen: u64,
    state: EngineState,
}

impl Strategy for ProbeStrategy {
    fn on_market_data(&mut self, _rec: &MdRecord) {
        self.md_seen += 1;
        // Stage one request per record so the writer thread has work.
        let mut req = RequestRecord::zeroed();
        req.order_id = 1_000_000 + self.md_seen as u32;
        req.strategy_id = 7;
        let _ = self.pipe.send(req);
    }

    fn on_response(&mut self, _resp: &ResponseRecord) {
        self.resp_seen += 1;
    }

    fn on_timer(&mut self, _now_ms: u64) {}

    fn handle_command(&mut self, cmd: Command) {
        if cmd == Command::Squareoff {
            self.state = EngineState::Stopped;
        }
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn status(&self) -> StatusSnapshot {
        let mut s = StatusSnapshot::empty(7);
        s.state = self.state;
        s.ticks = self.md_seen;
        s
    }

    fn snapshot_row(&self) -> SnapshotRow {
        let mut row = SnapshotRow::empty(7);
        row.leg1_symbol = "ag2603".into();
        row.leg2_symbol = "ag2605".into();
        row
    }
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn host_routes_records_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = HostConfig {
        md_path: dir.path().join("md"),
        request_path: dir.path().join("req"),
        response_path: dir.path().join("resp"),
        client_store_path: dir.path().join("clients"),
        tvar_path: None,
        md_capacity: 64,
        request_capacity: 64,
        response_capacity: 64,
        stage_capacity: 64,
        send_retries: 4,
        timer_interval: Duration::from_millis(20),
        snapshot_path: dir.path().join("day.txt"),
        cpu_core: None,
    };

    let kill = KillSwitch::new();
    let host = StrategyHost::attach(cfg.clone(), kill).unwrap();
    assert_eq!(host.client_id(), 1);

    let strategy = Arc::new(Mutex::new(ProbeStrategy {
        pipe: host.pipe(),
        md_seen: 0,
        resp_seen: 0,
        state: EngineState::Running,
    }));
    let probe = Arc::clone(&strategy);

    let commands = CommandQueue::new(8);
    let commands_tx = commands.clone();
    let status = Arc::new(RwLock::new(StatusSnapshot::empty(7)));
    let status_view = Arc::clone(&status);
    let metrics = Arc::new(Metrics::new().unwrap());

    // External peer handles, attached to the same segments.
    let md_feed: ShmRing<MdRecord> = ShmRing::open(&cfg.md_path).unwrap();
    let router_in: ShmRing<RequestRecord> = ShmRing::open(&cfg.request_path).unwrap();
    let router_out: ShmRing<ResponseRecord> = ShmRing::open(&cfg.response_path).unwrap();

    let runner = std::thread::spawn(move || {
        host.run(
            vec![StrategyEntry {
                strategy,
                strategy_id: 7,
                symbols: vec!["ag2603".to_string()],
            }],
            commands,
            status,
            metrics,
        )
    });

    // A registered symbol reaches the strategy; the staged request
    // comes out of the request ring.
    let mut rec = MdRecord::zeroed();
    rec.symbol = encode_symbol("ag2603");
    md_feed.try_push(&rec).unwrap();

    assert!(wait_until(Duration::from_secs(5), || probe.lock().md_seen == 1));
    assert!(wait_until(Duration::from_secs(5), || {
        router_in.try_pop().is_some()
    }));

    // An unregistered symbol is dropped before dispatch.
    let mut other = MdRecord::zeroed();
    other.symbol = encode_symbol("cu2602");
    md_feed.try_push(&other).unwrap();

    // Responses in our namespace with our strategy-id route through;
    // a foreign client's order-id is discarded silently.
    let mut resp = ResponseRecord::zeroed();
    resp.order_id = 1_000_001;
    resp.strategy_id = 7;
    resp.kind = ResponseKind::NewConfirm as u8;
    router_out.try_push(&resp).unwrap();

    let mut foreign = resp;
    foreign.order_id = 2_000_001;
    router_out.try_push(&foreign).unwrap();

    assert!(wait_until(Duration::from_secs(5), || probe.lock().resp_seen == 1));
    std::thread::sleep(Duration::from_millis(50));
    {
        let p = probe.lock();
        assert_eq!(p.md_seen, 1, "unregistered symbol must not dispatch");
        assert_eq!(p.resp_seen, 1, "foreign order-id must be dropped");
    }

    // The timer publishes status snapshots.
    assert!(wait_until(Duration::from_secs(5), || {
        status_view.read().ticks == 1
    }));

    // Squareoff brings the strategy to STOPPED and the host down.
    commands_tx.push(Command::Squareoff).unwrap();
    let result = runner.join().unwrap();
    assert!(result.is_ok());

    // The final snapshot was written with the frozen header.
    let text = std::fs::read_to_string(&cfg.snapshot_path).unwrap();
    assert!(text.starts_with("StrategyID 2day avgPx"));
    assert!(text.contains("ag2603"));
}
