//! avg-scalper: stop-loss averaging scalper for KRW spot markets
//!
//! This library provides the core components for:
//! - Market tick intake and replay
//! - Regime analysis over a rolling price window
//! - Averaged position bookkeeping with fee-adjusted pnl
//! - Layered risk gates and order sizing
//! - Partial-sell ladder and trailing stop exits
//! - The per-instance strategy state machine and its runner
//! - Retrying and paper order execution
//! - JSON state persistence
//! - Logging and Prometheus metrics

pub mod analysis;
pub mod cli;
pub mod config;
pub mod execution;
pub mod exit;
pub mod feed;
pub mod persistence;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod telemetry;
