//! Per-symbol instrument book
//!
//! One [`Instrument`] per subscribed contract: immutable contract
//! attributes plus a five-level bid/ask ladder refreshed from each
//! inbound market-data record. The controller reads mids and tops from
//! here; it never touches raw records after dispatch.

pub mod validator;

use crate::ipc::records::{MdRecord, DEPTH};
use serde::{Deserialize, Serialize};

/// Immutable contract attributes (from configuration)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Exchange code byte used on the wire.
    pub exchange: u8,
    /// Numeric exchange token.
    pub token: u32,
    pub tick_size: f64,
    pub lot_size: u32,
    /// Contract multiplier: units per lot, scales PnL.
    pub multiplier: f64,
    /// Price multiplier applied by some venues between wire and display.
    #[serde(default = "default_price_multiplier")]
    pub price_multiplier: f64,
    /// Whether outbound quantities are expressed in lots.
    #[serde(default)]
    pub send_in_lots: bool,
    /// Expiry date as YYYYMMDD.
    pub expiry: u32,
}

fn default_price_multiplier() -> f64 {
    1.0
}

/// One ladder level
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub qty: u32,
    pub orders: u32,
}

/// Live top-of-book state for one contract
#[derive(Debug, Clone)]
pub struct Instrument {
    spec: InstrumentSpec,
    bids: [BookLevel; DEPTH],
    asks: [BookLevel; DEPTH],
    bid_depth: u8,
    ask_depth: u8,
    pub last_price: f64,
    pub last_qty: u32,
    pub volume: u64,
    pub turnover: f64,
    pub last_update_ns: u64,
}

impl Instrument {
    pub fn new(spec: InstrumentSpec) -> Self {
        Self {
            spec,
            bids: [BookLevel::default(); DEPTH],
            asks: [BookLevel::default(); DEPTH],
            bid_depth: 0,
            ask_depth: 0,
            last_price: 0.0,
            last_qty: 0,
            volume: 0,
            turnover: 0.0,
            last_update_ns: 0,
        }
    }

    /// Copy ladder fields in from a validated market-data record.
    pub fn apply(&mut self, rec: &MdRecord) {
        for i in 0..DEPTH {
            self.bids[i] = BookLevel {
                price: rec.bids[i].price,
                qty: rec.bids[i].qty,
                orders: rec.bids[i].orders,
            };
            self.asks[i] = BookLevel {
                price: rec.asks[i].price,
                qty: rec.asks[i].qty,
                orders: rec.asks[i].orders,
            };
        }
        self.bid_depth = rec.bid_depth.min(DEPTH as u8);
        self.ask_depth = rec.ask_depth.min(DEPTH as u8);
        self.last_price = rec.last_price;
        self.last_qty = rec.last_qty;
        self.volume = rec.volume;
        self.turnover = rec.turnover;
        self.last_update_ns = rec.exchange_ts_ns;
    }

    #[inline(always)]
    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    #[inline(always)]
    pub fn symbol(&self) -> &str {
        &self.spec.symbol
    }

    #[inline(always)]
    pub fn tick_size(&self) -> f64 {
        self.spec.tick_size
    }

    /// Best bid, when that side is populated.
    #[inline]
    pub fn best_bid(&self) -> Option<f64> {
        if self.bid_depth > 0 && self.bids[0].price > 0.0 {
            Some(self.bids[0].price)
        } else {
            None
        }
    }

    /// Best ask, when that side is populated.
    #[inline]
    pub fn best_ask(&self) -> Option<f64> {
        if self.ask_depth > 0 && self.asks[0].price > 0.0 {
            Some(self.asks[0].price)
        } else {
            None
        }
    }

    #[inline]
    pub fn bid_level(&self, i: usize) -> Option<&BookLevel> {
        if i < self.bid_depth as usize {
            Some(&self.bids[i])
        } else {
            None
        }
    }

    #[inline]
    pub fn ask_level(&self, i: usize) -> Option<&BookLevel> {
        if i < self.ask_depth as usize {
            Some(&self.asks[i])
        } else {
            None
        }
    }

    /// Mid price, valid only when both sides are populated.
    #[inline]
    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Both sides quoted and not crossed.
    #[inline]
    pub fn has_valid_quotes(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b < a)
    }

    /// Marking price for unrealised PnL: mid when available, otherwise
    /// the last trade.
    #[inline]
    pub fn mark_price(&self) -> Option<f64> {
        self.mid().or({
            if self.last_price > 0.0 {
                Some(self.last_price)
            } else {
                None
            }
        })
    }

    /// Snap a price onto the tick grid (nearest tick).
    #[inline]
    pub fn round_to_tick(&self, price: f64) -> f64 {
        let tick = self.spec.tick_size;
        (price / tick).round() * tick
    }

    /// Whether a price sits on the tick grid (within float tolerance).
    #[inline]
    pub fn on_tick_grid(&self, price: f64) -> bool {
        let tick = self.spec.tick_size;
        let ticks = price / tick;
        (ticks - ticks.round()).abs() < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::records::{encode_symbol, MdRecord};
    use approx::assert_relative_eq;

    pub(crate) fn spec(symbol: &str, tick: f64) -> InstrumentSpec {
        InstrumentSpec {
            symbol: symbol.to_string(),
            exchange: 1,
            token: 4101,
            tick_size: tick,
            lot_size: 1,
            multiplier: 1.0,
            price_multiplier: 1.0,
            send_in_lots: false,
            expiry: 20260320,
        }
    }

    pub(crate) fn md(symbol: &str, bid: f64, ask: f64) -> MdRecord {
        let mut rec = MdRecord::zeroed();
        rec.symbol = encode_symbol(symbol);
        rec.bids[0].price = bid;
        rec.bids[0].qty = 10;
        rec.asks[0].price = ask;
        rec.asks[0].qty = 10;
        rec.bid_depth = 1;
        rec.ask_depth = 1;
        rec.exchange_ts_ns = 1;
        rec
    }

    #[test]
    fn test_apply_and_mid() {
        let mut inst = Instrument::new(spec("ag2603", 1.0));
        assert!(inst.mid().is_none());
        assert!(!inst.has_valid_quotes());

        inst.apply(&md("ag2603", 100.0, 101.0));
        assert_eq!(inst.best_bid(), Some(100.0));
        assert_eq!(inst.best_ask(), Some(101.0));
        assert_relative_eq!(inst.mid().unwrap(), 100.5);
        assert!(inst.has_valid_quotes());
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let mut inst = Instrument::new(spec("ag2603", 1.0));
        let mut rec = md("ag2603", 100.0, 0.0);
        rec.ask_depth = 0;
        inst.apply(&rec);

        assert_eq!(inst.best_bid(), Some(100.0));
        assert_eq!(inst.best_ask(), None);
        assert!(inst.mid().is_none());
        assert!(!inst.has_valid_quotes());
    }

    #[test]
    fn test_mark_price_falls_back_to_last_trade() {
        let mut inst = Instrument::new(spec("ag2603", 1.0));
        let mut rec = md("ag2603", 0.0, 0.0);
        rec.bid_depth = 0;
        rec.ask_depth = 0;
        rec.last_price = 99.0;
        inst.apply(&rec);

        assert_eq!(inst.mark_price(), Some(99.0));
    }

    #[test]
    fn test_tick_grid() {
        let inst = Instrument::new(spec("ag2603", 0.5));
        assert!(inst.on_tick_grid(100.0));
        assert!(inst.on_tick_grid(100.5));
        assert!(!inst.on_tick_grid(100.3));
        assert_relative_eq!(inst.round_to_tick(100.3), 100.5);
        assert_relative_eq!(inst.round_to_tick(100.2), 100.0);
    }
}
