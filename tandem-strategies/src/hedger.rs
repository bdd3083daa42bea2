//! Aggressive hedging controller
//!
//! Keeps residual exposure bounded by crossing the hedge leg's book.
//! A fresh hedge joins the far touch; while the same need persists
//! inside the re-price window the price ladder escalates (one tick, two
//! ticks, then a `slop`-tick jump), and a further attempt gives up and
//! escalates to squareoff.
//!
//! The window is wall-clock, not tick-count: after a feed gap longer
//! than the window the ladder restarts fresh — a stale retry ladder is
//! more dangerous than a new one.

use tandem_core::Side;

/// Wall-clock re-price window.
pub const REPRICE_WINDOW_MS: u64 = 500;

/// Escalations allowed inside one window before giving up.
pub const MAX_REPEAT: u32 = 3;

/// What the controller should do about current exposure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HedgePlan {
    /// Exposure is zero, or the hedge leg has no usable touch yet.
    Hold,
    /// Send a marketable order at `price` for the full residual.
    Order { side: Side, price: f64 },
    /// Retry budget exhausted: flatten everything.
    Squareoff,
}

/// Hedging state machine for the aggressive leg
#[derive(Debug, Clone)]
pub struct Hedger {
    window_ms: u64,
    agg_repeat: u32,
    last_side: Option<Side>,
    last_sent_ms: u64,
}

impl Hedger {
    pub fn new() -> Self {
        Self::with_window(REPRICE_WINDOW_MS)
    }

    pub fn with_window(window_ms: u64) -> Self {
        Self {
            window_ms,
            agg_repeat: 0,
            last_side: None,
            last_sent_ms: 0,
        }
    }

    /// Forget the ladder (squareoff entry, session restart).
    pub fn reset(&mut self) {
        self.agg_repeat = 0;
        self.last_side = None;
        self.last_sent_ms = 0;
    }

    #[inline(always)]
    pub fn repeat(&self) -> u32 {
        self.agg_repeat
    }

    /// Decide the next hedge action.
    ///
    /// - `exposure`: signed residual (positive = net long, needs a sell);
    /// - `has_working`: any live aggressive order on the hedge leg,
    ///   confirmed or still in flight;
    /// - `best_bid`/`best_ask`: the hedge leg's touch;
    /// - `tick`/`slop`: price grid and the final escalation step.
    ///
    /// On `Order`, the caller sends and this state machine advances; the
    /// caller cancels any previous still-live attempt first.
    pub fn plan(
        &mut self,
        exposure: i64,
        has_working: bool,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        tick: f64,
        slop: u32,
        now_ms: u64,
    ) -> HedgePlan {
        if exposure == 0 {
            return HedgePlan::Hold;
        }

        let side = if exposure > 0 { Side::Sell } else { Side::Buy };
        let top = match side {
            Side::Sell => best_bid,
            Side::Buy => best_ask,
        };
        let Some(top) = top else {
            return HedgePlan::Hold;
        };

        let fresh = !has_working
            || self.last_side != Some(side)
            || now_ms.saturating_sub(self.last_sent_ms) > self.window_ms;

        if fresh {
            self.agg_repeat = 1;
            self.last_side = Some(side);
            self.last_sent_ms = now_ms;
            return HedgePlan::Order { side, price: top };
        }

        // Same side, still inside the window: escalate.
        if self.agg_repeat > MAX_REPEAT {
            return HedgePlan::Squareoff;
        }
        let steps = if self.agg_repeat == MAX_REPEAT {
            slop as f64
        } else {
            self.agg_repeat as f64
        };
        let price = match side {
            Side::Sell => top - tick * steps,
            Side::Buy => top + tick * steps,
        };
        self.agg_repeat += 1;
        self.last_sent_ms = now_ms;
        HedgePlan::Order { side, price }
    }
}

impl Default for Hedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sell_plan(h: &mut Hedger, has_working: bool, now: u64) -> HedgePlan {
        h.plan(1, has_working, Some(50.0), Some(51.0), 1.0, 5, now)
    }

    #[test]
    fn test_zero_exposure_holds() {
        let mut h = Hedger::new();
        assert_eq!(
            h.plan(0, false, Some(50.0), Some(51.0), 1.0, 5, 0),
            HedgePlan::Hold
        );
    }

    #[test]
    fn test_fresh_hedge_joins_the_touch() {
        let mut h = Hedger::new();
        match sell_plan(&mut h, false, 0) {
            HedgePlan::Order { side, price } => {
                assert_eq!(side, Side::Sell);
                assert_relative_eq!(price, 50.0);
            }
            other => panic!("expected order, got {other:?}"),
        }
        assert_eq!(h.repeat(), 1);

        // Buy-side exposure crosses at the ask.
        let mut h = Hedger::new();
        match h.plan(-3, false, Some(50.0), Some(51.0), 1.0, 5, 0) {
            HedgePlan::Order { side, price } => {
                assert_eq!(side, Side::Buy);
                assert_relative_eq!(price, 51.0);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn test_escalation_ladder_then_squareoff() {
        let mut h = Hedger::new();

        // 50, 49, 48, then the slop jump to 45; the fifth attempt quits.
        let expected = [50.0, 49.0, 48.0, 45.0];
        for (i, want) in expected.iter().enumerate() {
            let now = i as u64 * 100;
            match sell_plan(&mut h, i > 0, now) {
                HedgePlan::Order { price, .. } => assert_relative_eq!(price, *want),
                other => panic!("attempt {i}: expected order, got {other:?}"),
            }
        }
        assert_eq!(sell_plan(&mut h, true, 400), HedgePlan::Squareoff);
    }

    #[test]
    fn test_window_expiry_restarts_ladder() {
        let mut h = Hedger::new();
        sell_plan(&mut h, false, 0);
        sell_plan(&mut h, true, 100); // escalate to 49
        assert_eq!(h.repeat(), 2);

        // A gap past the window resets to a fresh touch order.
        match sell_plan(&mut h, true, 700) {
            HedgePlan::Order { price, .. } => assert_relative_eq!(price, 50.0),
            other => panic!("expected fresh order, got {other:?}"),
        }
        assert_eq!(h.repeat(), 1);
    }

    #[test]
    fn test_side_flip_restarts_ladder() {
        let mut h = Hedger::new();
        sell_plan(&mut h, false, 0);
        sell_plan(&mut h, true, 100);

        // Exposure flips to short: fresh buy at the ask.
        match h.plan(-2, true, Some(50.0), Some(51.0), 1.0, 5, 200) {
            HedgePlan::Order { side, price } => {
                assert_eq!(side, Side::Buy);
                assert_relative_eq!(price, 51.0);
            }
            other => panic!("expected fresh buy, got {other:?}"),
        }
        assert_eq!(h.repeat(), 1);
    }

    #[test]
    fn test_missing_touch_holds() {
        let mut h = Hedger::new();
        assert_eq!(h.plan(1, false, None, Some(51.0), 1.0, 5, 0), HedgePlan::Hold);
        assert_eq!(h.plan(-1, false, Some(50.0), None, 1.0, 5, 0), HedgePlan::Hold);
    }

    #[test]
    fn test_reset_forgets_ladder() {
        let mut h = Hedger::new();
        sell_plan(&mut h, false, 0);
        sell_plan(&mut h, true, 100);
        h.reset();
        match sell_plan(&mut h, true, 150) {
            HedgePlan::Order { price, .. } => assert_relative_eq!(price, 50.0),
            other => panic!("expected fresh order after reset, got {other:?}"),
        }
    }
}
