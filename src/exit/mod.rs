//! Profit-taking exits
//!
//! Partial-sell ladder and trailing stop for an open position

mod partial;
mod trailing;

pub use partial::{Milestone, MilestoneHit, PartialSellManager};
pub use trailing::{TrailingConfig, TrailingState, TrailingStopManager};
