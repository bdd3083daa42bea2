//! Net-position accounting (single-account offset rule)
//!
//! Positions follow the Chinese-futures convention: an opposite-side fill
//! first closes existing holdings, and only the remainder opens on the
//! other side. Long and short quantities are tracked separately with
//! volume-weighted average prices, so at any moment at most one of the
//! two is nonzero.
//!
//! All mutation happens under the controller mutex; the struct is plain
//! data with no interior synchronisation.

use crate::core::Side;

/// Per-leg position, PnL, and turnover state
#[derive(Debug, Clone)]
pub struct PositionState {
    multiplier: f64,
    fee_per_lot: f64,

    long_qty: i64,
    short_qty: i64,
    avg_long: f64,
    avg_short: f64,

    /// Yesterday's carried quantity not yet offset (close-yesterday flag).
    ytd_remaining: i64,

    pub buy_qty: i64,
    pub sell_qty: i64,
    pub buy_value: f64,
    pub sell_value: f64,

    realized: f64,
    unrealized: f64,
    fees_paid: f64,

    /// High-water-mark of total PnL, for drawdown tracking.
    pnl_peak: f64,
}

impl PositionState {
    pub fn new(multiplier: f64, fee_per_lot: f64) -> Self {
        Self {
            multiplier,
            fee_per_lot,
            long_qty: 0,
            short_qty: 0,
            avg_long: 0.0,
            avg_short: 0.0,
            ytd_remaining: 0,
            buy_qty: 0,
            sell_qty: 0,
            buy_value: 0.0,
            sell_value: 0.0,
            realized: 0.0,
            unrealized: 0.0,
            fees_paid: 0.0,
            pnl_peak: 0.0,
        }
    }

    /// Seed a carried (yesterday) position from the day-start snapshot.
    ///
    /// The snapshot stores quantity only, so the carried lot enters with
    /// a zero cost basis; the first mark observed for this leg becomes
    /// the basis (see [`PositionState::mark`]).
    pub fn seed_carry(&mut self, qty: i64) {
        if qty > 0 {
            self.long_qty += qty;
        } else if qty < 0 {
            self.short_qty += -qty;
        }
        self.ytd_remaining += qty.abs();
    }

    /// Net position: long minus short, long positive.
    #[inline(always)]
    pub fn net(&self) -> i64 {
        self.long_qty - self.short_qty
    }

    #[inline(always)]
    pub fn long_qty(&self) -> i64 {
        self.long_qty
    }

    #[inline(always)]
    pub fn short_qty(&self) -> i64 {
        self.short_qty
    }

    #[inline(always)]
    pub fn avg_long(&self) -> f64 {
        self.avg_long
    }

    #[inline(always)]
    pub fn avg_short(&self) -> f64 {
        self.avg_short
    }

    /// Average price of the currently held side (zero when flat).
    #[inline]
    pub fn position_avg(&self) -> f64 {
        let net = self.net();
        if net > 0 {
            self.avg_long
        } else if net < 0 {
            self.avg_short
        } else {
            0.0
        }
    }

    #[inline(always)]
    pub fn is_flat(&self) -> bool {
        self.net() == 0
    }

    #[inline(always)]
    pub fn realized(&self) -> f64 {
        self.realized
    }

    #[inline(always)]
    pub fn unrealized(&self) -> f64 {
        self.unrealized
    }

    #[inline(always)]
    pub fn total_pnl(&self) -> f64 {
        self.realized + self.unrealized
    }

    #[inline(always)]
    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    /// Drawdown from the total-PnL high-water-mark (non-negative).
    #[inline]
    pub fn drawdown(&self) -> f64 {
        (self.pnl_peak - self.total_pnl()).max(0.0)
    }

    /// Carried quantity still open; a closing order offsets yesterday
    /// first, so the router flag is close-yesterday while this is > 0.
    #[inline(always)]
    pub fn ytd_remaining(&self) -> i64 {
        self.ytd_remaining
    }

    /// Apply one fill. Closes the opposite side first, then opens the
    /// remainder. Returns the realised-PnL delta of this fill.
    pub fn apply_fill(&mut self, side: Side, price: f64, qty: u32) -> f64 {
        let mut q = qty as i64;
        let notional = price * q as f64;
        let mut realized_delta = 0.0;

        match side {
            Side::Buy => {
                self.buy_qty += q;
                self.buy_value += notional;

                // Close short first.
                let close = q.min(self.short_qty);
                if close > 0 {
                    realized_delta += (self.avg_short - price) * close as f64 * self.multiplier;
                    self.short_qty -= close;
                    if self.short_qty == 0 {
                        self.avg_short = 0.0;
                    }
                    q -= close;
                }
                // Remainder opens long.
                if q > 0 {
                    let total = self.long_qty + q;
                    self.avg_long =
                        (self.avg_long * self.long_qty as f64 + price * q as f64) / total as f64;
                    self.long_qty = total;
                }
                if close > 0 {
                    self.consume_ytd(close);
                }
            }
            Side::Sell => {
                self.sell_qty += q;
                self.sell_value += notional;

                // Close long first.
                let close = q.min(self.long_qty);
                if close > 0 {
                    realized_delta += (price - self.avg_long) * close as f64 * self.multiplier;
                    self.long_qty -= close;
                    if self.long_qty == 0 {
                        self.avg_long = 0.0;
                    }
                    q -= close;
                }
                // Remainder opens short.
                if q > 0 {
                    let total = self.short_qty + q;
                    self.avg_short =
                        (self.avg_short * self.short_qty as f64 + price * q as f64) / total as f64;
                    self.short_qty = total;
                }
                if close > 0 {
                    self.consume_ytd(close);
                }
            }
        }

        self.realized += realized_delta;
        self.fees_paid += qty as f64 * self.fee_per_lot;
        realized_delta
    }

    fn consume_ytd(&mut self, closed: i64) {
        self.ytd_remaining = (self.ytd_remaining - closed).max(0);
    }

    /// Recompute unrealised PnL against a marking price and advance the
    /// drawdown high-water-mark. Carried lots with no basis adopt the
    /// first mark as their entry.
    pub fn mark(&mut self, mark_price: f64) {
        let net = self.net();
        if net > 0 && self.avg_long == 0.0 {
            self.avg_long = mark_price;
        } else if net < 0 && self.avg_short == 0.0 {
            self.avg_short = mark_price;
        }

        self.unrealized = if net == 0 {
            0.0
        } else {
            net as f64 * (mark_price - self.position_avg()) * self.multiplier
        };

        let total = self.total_pnl();
        if total > self.pnl_peak {
            self.pnl_peak = total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pos() -> PositionState {
        PositionState::new(1.0, 0.0)
    }

    #[test]
    fn test_open_long_then_close() {
        let mut p = pos();
        p.apply_fill(Side::Buy, 100.0, 10);
        assert_eq!(p.net(), 10);
        assert_eq!(p.long_qty(), 10);
        assert_eq!(p.short_qty(), 0);
        assert_relative_eq!(p.avg_long(), 100.0);

        let delta = p.apply_fill(Side::Sell, 103.0, 10);
        assert_relative_eq!(delta, 30.0);
        assert_eq!(p.net(), 0);
        assert_relative_eq!(p.realized(), 30.0);
        assert_relative_eq!(p.avg_long(), 0.0);
    }

    #[test]
    fn test_close_then_open_on_crossing_fill() {
        let mut p = pos();
        p.apply_fill(Side::Sell, 50.0, 5);
        assert_eq!(p.net(), -5);

        // Buy 8: closes the 5-lot short, opens 3 long.
        let delta = p.apply_fill(Side::Buy, 48.0, 8);
        assert_relative_eq!(delta, (50.0 - 48.0) * 5.0);
        assert_eq!(p.net(), 3);
        assert_eq!(p.long_qty(), 3);
        assert_eq!(p.short_qty(), 0);
        assert_relative_eq!(p.avg_long(), 48.0);
    }

    #[test]
    fn test_weighted_average_open() {
        let mut p = pos();
        p.apply_fill(Side::Buy, 100.0, 10);
        p.apply_fill(Side::Buy, 110.0, 30);
        assert_eq!(p.long_qty(), 40);
        assert_relative_eq!(p.avg_long(), (100.0 * 10.0 + 110.0 * 30.0) / 40.0);
    }

    #[test]
    fn test_multiplier_scales_pnl() {
        let mut p = PositionState::new(15.0, 0.0);
        p.apply_fill(Side::Buy, 100.0, 2);
        let delta = p.apply_fill(Side::Sell, 101.0, 2);
        assert_relative_eq!(delta, 1.0 * 2.0 * 15.0);
    }

    #[test]
    fn test_unrealized_and_drawdown() {
        let mut p = pos();
        p.apply_fill(Side::Buy, 100.0, 10);

        p.mark(105.0);
        assert_relative_eq!(p.unrealized(), 50.0);
        assert_relative_eq!(p.total_pnl(), 50.0);
        assert_relative_eq!(p.drawdown(), 0.0);

        p.mark(98.0);
        assert_relative_eq!(p.unrealized(), -20.0);
        assert_relative_eq!(p.drawdown(), 70.0);
    }

    #[test]
    fn test_short_unrealized_sign() {
        let mut p = pos();
        p.apply_fill(Side::Sell, 100.0, 10);
        p.mark(95.0);
        assert_relative_eq!(p.unrealized(), 50.0);
        p.mark(102.0);
        assert_relative_eq!(p.unrealized(), -20.0);
    }

    #[test]
    fn test_carry_adopts_first_mark_as_basis() {
        let mut p = pos();
        p.seed_carry(83);
        assert_eq!(p.net(), 83);
        assert_eq!(p.ytd_remaining(), 83);

        p.mark(96.5);
        assert_relative_eq!(p.avg_long(), 96.5);
        assert_relative_eq!(p.unrealized(), 0.0);

        p.mark(97.5);
        assert_relative_eq!(p.unrealized(), 83.0);
    }

    #[test]
    fn test_ytd_consumed_before_today() {
        let mut p = pos();
        p.seed_carry(5);
        p.mark(100.0);
        p.apply_fill(Side::Buy, 100.0, 3);
        assert_eq!(p.net(), 8);
        assert_eq!(p.ytd_remaining(), 5);

        p.apply_fill(Side::Sell, 100.0, 4);
        assert_eq!(p.ytd_remaining(), 1);

        p.apply_fill(Side::Sell, 100.0, 4);
        assert_eq!(p.ytd_remaining(), 0);
        assert_eq!(p.net(), 0);
    }

    #[test]
    fn test_turnover_counters() {
        let mut p = pos();
        p.apply_fill(Side::Buy, 100.0, 10);
        p.apply_fill(Side::Sell, 101.0, 4);
        assert_eq!(p.buy_qty, 10);
        assert_eq!(p.sell_qty, 4);
        assert_relative_eq!(p.buy_value, 1000.0);
        assert_relative_eq!(p.sell_value, 404.0);
    }

    #[test]
    fn test_fees_tallied_separately() {
        let mut p = PositionState::new(1.0, 0.25);
        p.apply_fill(Side::Buy, 100.0, 10);
        p.apply_fill(Side::Sell, 100.0, 10);
        assert_relative_eq!(p.fees_paid(), 5.0);
        // Gross realised PnL stays reconstructable from fills alone.
        assert_relative_eq!(p.realized(), 0.0);
    }

    #[test]
    fn test_one_side_held_invariant() {
        let mut p = pos();
        p.apply_fill(Side::Buy, 100.0, 10);
        p.apply_fill(Side::Sell, 100.0, 25);
        p.apply_fill(Side::Buy, 100.0, 7);
        assert_eq!(p.long_qty() * p.short_qty(), 0);
        assert_eq!(p.net(), 10 - 25 + 7);
    }
}
