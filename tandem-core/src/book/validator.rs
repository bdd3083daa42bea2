//! Market-data record validation
//!
//! First line of defense against trading on corrupted data. A record
//! that fails any check is dropped whole: the book keeps its previous
//! state and the spread statistics do not advance.

use crate::ipc::records::MdRecord;

/// Reasons a market-data record is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    #[error("non-positive or non-finite {side} price {price} at level {level}")]
    BadPrice {
        side: &'static str,
        level: usize,
        price: f64,
    },
    #[error("book inverted: bid {bid} >= ask {ask}")]
    Inverted { bid: f64, ask: f64 },
    #[error("{side} ladder not monotonic at level {level}")]
    NonMonotonic { side: &'static str, level: usize },
    #[error("price {price} off the {tick} tick grid")]
    OffGrid { price: f64, tick: f64 },
}

/// Validate ladder structure: positive finite prices, monotonic levels
/// (bids descending, asks ascending), and no inversion at the touch.
pub fn validate(rec: &MdRecord) -> Result<(), TickError> {
    let bid_depth = (rec.bid_depth as usize).min(rec.bids.len());
    let ask_depth = (rec.ask_depth as usize).min(rec.asks.len());

    for i in 0..bid_depth {
        let p = rec.bids[i].price;
        if !(p.is_finite() && p > 0.0) {
            return Err(TickError::BadPrice {
                side: "bid",
                level: i,
                price: p,
            });
        }
        if i > 0 && p >= rec.bids[i - 1].price {
            return Err(TickError::NonMonotonic {
                side: "bid",
                level: i,
            });
        }
    }
    for i in 0..ask_depth {
        let p = rec.asks[i].price;
        if !(p.is_finite() && p > 0.0) {
            return Err(TickError::BadPrice {
                side: "ask",
                level: i,
                price: p,
            });
        }
        if i > 0 && p <= rec.asks[i - 1].price {
            return Err(TickError::NonMonotonic {
                side: "ask",
                level: i,
            });
        }
    }

    if bid_depth > 0 && ask_depth > 0 && rec.bids[0].price >= rec.asks[0].price {
        return Err(TickError::Inverted {
            bid: rec.bids[0].price,
            ask: rec.asks[0].price,
        });
    }

    Ok(())
}

/// Structural validation plus tick-grid conformance at the touch.
pub fn validate_on_grid(rec: &MdRecord, tick: f64) -> Result<(), TickError> {
    validate(rec)?;
    if tick <= 0.0 {
        return Ok(());
    }
    for (depth, levels) in [
        (rec.bid_depth as usize, &rec.bids),
        (rec.ask_depth as usize, &rec.asks),
    ] {
        for level in levels.iter().take(depth.min(levels.len())) {
            let ticks = level.price / tick;
            if (ticks - ticks.round()).abs() >= 1e-6 {
                return Err(TickError::OffGrid {
                    price: level.price,
                    tick,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::records::MdRecord;

    fn two_level(bid0: f64, bid1: f64, ask0: f64, ask1: f64) -> MdRecord {
        let mut rec = MdRecord::zeroed();
        rec.bids[0].price = bid0;
        rec.bids[1].price = bid1;
        rec.asks[0].price = ask0;
        rec.asks[1].price = ask1;
        rec.bid_depth = 2;
        rec.ask_depth = 2;
        rec
    }

    #[test]
    fn test_well_formed_record_passes() {
        let rec = two_level(100.0, 99.0, 101.0, 102.0);
        assert_eq!(validate(&rec), Ok(()));
        assert_eq!(validate_on_grid(&rec, 1.0), Ok(()));
    }

    #[test]
    fn test_negative_price_rejected() {
        let rec = two_level(-100.0, 99.0, 101.0, 102.0);
        assert!(matches!(
            validate(&rec),
            Err(TickError::BadPrice { side: "bid", .. })
        ));
    }

    #[test]
    fn test_nan_price_rejected() {
        let rec = two_level(100.0, 99.0, f64::NAN, 102.0);
        assert!(matches!(
            validate(&rec),
            Err(TickError::BadPrice { side: "ask", .. })
        ));
    }

    #[test]
    fn test_inverted_book_rejected() {
        let rec = two_level(101.0, 99.0, 100.0, 102.0);
        assert!(matches!(validate(&rec), Err(TickError::Inverted { .. })));
    }

    #[test]
    fn test_non_monotonic_ladder_rejected() {
        // Second bid above the first.
        let rec = two_level(100.0, 100.5, 101.0, 102.0);
        assert!(matches!(
            validate(&rec),
            Err(TickError::NonMonotonic { side: "bid", .. })
        ));

        // Second ask below the first.
        let rec = two_level(100.0, 99.0, 102.0, 101.5);
        assert!(matches!(
            validate(&rec),
            Err(TickError::NonMonotonic { side: "ask", .. })
        ));
    }

    #[test]
    fn test_off_grid_price_rejected() {
        let rec = two_level(100.3, 99.0, 101.0, 102.0);
        assert_eq!(validate(&rec), Ok(()));
        assert!(matches!(
            validate_on_grid(&rec, 1.0),
            Err(TickError::OffGrid { .. })
        ));
    }

    #[test]
    fn test_levels_past_depth_ignored() {
        let mut rec = two_level(100.0, 0.0, 101.0, 0.0);
        rec.bid_depth = 1;
        rec.ask_depth = 1;
        // Garbage beyond the declared depth does not fail validation.
        rec.bids[3].price = -5.0;
        assert_eq!(validate(&rec), Ok(()));
    }
}
