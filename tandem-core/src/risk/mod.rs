//! Risk caps
//!
//! Evaluated per leg after every fill and on every own-leg tick. Any
//! breach escalates to controller squareoff: fatal for trading activity,
//! not for the process.

use crate::oms::LegManager;
use serde::{Deserialize, Serialize};

/// Loss and reject caps from the model file. `None` disables a cap.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RiskLimits {
    /// Cap on |realised PnL| per leg.
    #[serde(default)]
    pub stop_loss: Option<f64>,
    /// Cap on |realised + unrealised| per leg.
    #[serde(default)]
    pub max_loss: Option<f64>,
    /// Cap on |unrealised PnL| per leg.
    #[serde(default)]
    pub upnl_loss: Option<f64>,
    /// Cap on the combined reject count across both legs.
    #[serde(default)]
    pub max_reject_count: Option<u32>,
}

/// Which cap tripped
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RiskBreach {
    StopLoss { leg: usize, realized: f64 },
    MaxLoss { leg: usize, total: f64 },
    UpnlLoss { leg: usize, unrealized: f64 },
    RejectCount { rejects: u32 },
}

impl RiskLimits {
    /// Check one leg's PnL caps.
    pub fn check_leg(&self, leg_index: usize, leg: &LegManager) -> Option<RiskBreach> {
        let pos = leg.position();
        if let Some(cap) = self.stop_loss {
            if pos.realized().abs() > cap {
                return Some(RiskBreach::StopLoss {
                    leg: leg_index,
                    realized: pos.realized(),
                });
            }
        }
        if let Some(cap) = self.max_loss {
            if pos.total_pnl().abs() > cap {
                return Some(RiskBreach::MaxLoss {
                    leg: leg_index,
                    total: pos.total_pnl(),
                });
            }
        }
        if let Some(cap) = self.upnl_loss {
            if pos.unrealized().abs() > cap {
                return Some(RiskBreach::UpnlLoss {
                    leg: leg_index,
                    unrealized: pos.unrealized(),
                });
            }
        }
        None
    }

    /// Check both legs plus the combined reject budget.
    pub fn check_pair(&self, leg1: &LegManager, leg2: &LegManager) -> Option<RiskBreach> {
        if let Some(b) = self.check_leg(0, leg1) {
            return Some(b);
        }
        if let Some(b) = self.check_leg(1, leg2) {
            return Some(b);
        }
        if let Some(cap) = self.max_reject_count {
            let rejects = leg1.reject_count() + leg2.reject_count();
            if rejects > cap {
                return Some(RiskBreach::RejectCount { rejects });
            }
        }
        None
    }
}
