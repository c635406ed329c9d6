//! Position module
//!
//! Cost-basis tracking for a single open position across multiple entries

mod manager;
mod types;

pub use manager::PositionManager;
pub use types::{
    EntryKind, FeeSchedule, Pnl, Position, PositionEntry, PositionError, PositionStatus,
    RealizedSlice, SellOutcome,
};
