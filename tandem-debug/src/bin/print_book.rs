//! Market-data queue printer
//!
//! Attaches to a market-data ring and prints inbound ladders. Useful
//! for checking that the feeder is publishing, and for eyeballing the
//! books a strategy would see.
//!
//! Note: popping consumes records from the shared queue; point this at
//! a live strategy's queue only when the strategy is down.
//!
//! ```bash
//! print-book --key 9001 --count 20
//! print-book --key 9001 --format json
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tandem_core::ipc::{decode_symbol, queue_path, MdRecord, ShmRing};

#[derive(Parser)]
#[command(name = "print-book")]
#[command(about = "Print market-data records from a shared-memory queue", long_about = None)]
struct Args {
    /// Queue key (resolves to /dev/shm/tdm_q{key})
    #[arg(long)]
    key: Option<u32>,

    /// Explicit segment path (overrides --key)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Records to print before exiting
    #[arg(long, default_value = "10")]
    count: usize,

    /// Give up after this many seconds without data
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Output format: plain or json
    #[arg(long, default_value = "plain")]
    format: String,
}

fn print_plain(n: usize, rec: &MdRecord) {
    println!(
        "#{:<4} {:<10} seq={:<8} last={:.2}x{}",
        n,
        decode_symbol(&rec.symbol),
        rec.sequence,
        rec.last_price,
        rec.last_qty
    );
    let depth = rec.bid_depth.max(rec.ask_depth) as usize;
    for level in 0..depth.min(rec.bids.len()) {
        let bid = rec.bids[level];
        let ask = rec.asks[level];
        println!(
            "  [{}] {:>8} @ {:>10.2} | {:<10.2} @ {:<8}",
            level, bid.qty, bid.price, ask.price, ask.qty
        );
    }
}

fn print_json(rec: &MdRecord) -> Result<()> {
    let levels = |side: &[tandem_core::ipc::WireLevel], depth: u8| -> Vec<serde_json::Value> {
        side.iter()
            .take(depth as usize)
            .map(|l| json!({"price": l.price, "qty": l.qty, "orders": l.orders}))
            .collect()
    };
    let doc = json!({
        "symbol": decode_symbol(&rec.symbol),
        "sequence": rec.sequence,
        "exchange_ts_ns": rec.exchange_ts_ns,
        "bids": levels(&rec.bids, rec.bid_depth),
        "asks": levels(&rec.asks, rec.ask_depth),
        "last_price": rec.last_price,
        "last_qty": rec.last_qty,
        "volume": rec.volume,
        "turnover": rec.turnover,
    });
    println!("{}", serde_json::to_string(&doc)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let path = match (&args.path, args.key) {
        (Some(path), _) => path.clone(),
        (None, Some(key)) => queue_path(key),
        (None, None) => bail!("pass --key or --path"),
    };

    let ring: ShmRing<MdRecord> = ShmRing::open(&path)?;
    eprintln!(
        "attached {} (capacity {}, {} unread)",
        path.display(),
        ring.capacity(),
        ring.len()
    );

    let start = Instant::now();
    let mut printed = 0usize;
    while printed < args.count {
        match ring.try_pop() {
            Some(rec) => {
                printed += 1;
                match args.format.as_str() {
                    "json" => print_json(&rec)?,
                    _ => print_plain(printed, &rec),
                }
            }
            None => {
                if start.elapsed() > Duration::from_secs(args.timeout_secs) {
                    eprintln!("no data for {}s, giving up", args.timeout_secs);
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    Ok(())
}
