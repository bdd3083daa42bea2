//! Order management: working orders, fill accounting, leg manager

pub mod leg;
pub mod order;
pub mod position;

pub use leg::{FillEvent, LegEvent, LegManager, LegParams};
pub use order::Order;
pub use position::PositionState;
