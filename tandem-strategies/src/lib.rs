//! Tandem Strategies - pairwise arbitrage logic
//!
//! The trading brain on top of `tandem-core`'s plumbing:
//! - `spread`: EMA spread mean plus rolling standard deviation
//! - `thresholds`: inventory-scaled place/remove thresholds
//! - `hedger`: exposure-driven aggressive hedging with a bounded
//!   re-price ladder
//! - `pair`: the controller composing two leg managers with the above
//!
//! Variants share the host's capability interface (`on_market_data`,
//! `on_response`, `on_timer`) rather than an inheritance tree; the pair
//! controller composes two leg managers, parameterised by the side each
//! one quotes.

pub mod hedger;
pub mod pair;
pub mod spread;
pub mod test_helpers;
pub mod thresholds;

pub use hedger::{HedgePlan, Hedger, MAX_REPEAT, REPRICE_WINDOW_MS};
pub use pair::PairStrategy;
pub use spread::{SpreadAnalyzer, SpreadReading};
pub use thresholds::{derive, DerivedThresholds, ThresholdSet};
