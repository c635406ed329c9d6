//! Risk management module
//!
//! Account- and session-level gates evaluated before new entries

mod controller;
mod types;

pub use controller::RiskController;
pub use types::{GateDecision, GateInput, RiskCheck, RiskLimits, SuspensionReason};
