//! Property tests for the threshold engine and the hedger

use proptest::prelude::*;
use tandem_strategies::hedger::{HedgePlan, Hedger};
use tandem_strategies::thresholds::{derive, ThresholdSet};

fn threshold_sets() -> impl Strategy<Value = ThresholdSet> {
    // Valid model orderings: short <= begin <= long for both families.
    (
        0.5f64..3.0,
        0.0f64..2.0,
        0.0f64..2.0,
        0.2f64..1.5,
        0.0f64..1.0,
        0.0f64..1.0,
        1i64..1000,
    )
        .prop_map(
            |(begin_place, up_p, down_p, begin_remove, up_r, down_r, max_size)| ThresholdSet {
                begin_place,
                long_place: begin_place + up_p,
                short_place: begin_place - down_p,
                begin_remove,
                long_remove: begin_remove + up_r,
                short_remove: begin_remove - down_r,
                max_size,
                ..Default::default()
            },
        )
}

proptest! {
    /// Flat inventory leaves both sides at the begin thresholds.
    #[test]
    fn flat_thresholds_symmetric(t in threshold_sets()) {
        let d = derive(&t, 0);
        prop_assert_eq!(d.bid_place, t.begin_place);
        prop_assert_eq!(d.ask_place, t.begin_place);
        prop_assert_eq!(d.bid_remove, t.begin_remove);
        prop_assert_eq!(d.ask_remove, t.begin_remove);
    }

    /// Adding gets monotonically harder as inventory grows: bid_place is
    /// non-decreasing in net, ask_place non-increasing, across the whole
    /// signed range.
    #[test]
    fn place_thresholds_monotone_in_inventory(
        t in threshold_sets(),
        a in -1000i64..1000,
        b in -1000i64..1000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = lo.clamp(-t.max_size, t.max_size);
        let hi = hi.clamp(-t.max_size, t.max_size);
        let d_lo = derive(&t, lo);
        let d_hi = derive(&t, hi);
        prop_assert!(d_lo.bid_place <= d_hi.bid_place + 1e-12);
        prop_assert!(d_lo.ask_place + 1e-12 >= d_hi.ask_place);
    }

    /// Inverting the position mirrors the thresholds.
    #[test]
    fn thresholds_mirror_under_position_flip(t in threshold_sets(), n in 1i64..1000) {
        let n = n.min(t.max_size);
        let long = derive(&t, n);
        let short = derive(&t, -n);
        // bid when long uses the L coefficient, exactly as ask when short.
        prop_assert!((long.bid_place - short.ask_place).abs() < 1e-9);
        prop_assert!((long.ask_place - short.bid_place).abs() < 1e-9);
    }

    /// From any nonzero exposure against a static book, the hedger
    /// either exhausts in at most four priced attempts and then trips
    /// squareoff, or would have been filled along the way.
    #[test]
    fn hedger_converges_or_squares_off(
        exposure in prop_oneof![-1000i64..-1, 1i64..1000],
        start in 0u64..1_000_000,
        slop in 1u32..50,
    ) {
        let mut hedger = Hedger::new();
        let mut attempts = 0u32;
        for i in 0..10u64 {
            let now = start + i * 100;
            match hedger.plan(exposure, i > 0, Some(50.0), Some(51.0), 1.0, slop, now) {
                HedgePlan::Order { .. } => attempts += 1,
                HedgePlan::Squareoff => {
                    prop_assert!(attempts <= 4, "squareoff after {attempts} attempts");
                    prop_assert_eq!(attempts, 4);
                    return Ok(());
                }
                HedgePlan::Hold => prop_assert!(false, "hedger stalled with exposure"),
            }
        }
        prop_assert!(false, "hedger never gave up against a dead book");
    }
}
