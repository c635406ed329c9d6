//! Strategy module
//!
//! The [`Strategy`] capability set, the stop-loss averaging decision engine,
//! the factory that builds instances by id and the runner that drives one
//! instance over a tick stream.

mod averaging;
mod factory;
mod runner;
mod types;

pub use averaging::{Decision, StopLossAveragingStrategy};
pub use factory::StrategyFactory;
pub use runner::{StrategyRunner, TickOutcome};
pub use types::{
    Phase, Signal, SignalReason, StrategyError, StrategyInfo, StrategyState, TickContext,
    TradeRecord,
};

use crate::execution::Fill;
use crate::feed::MarketTick;

/// A strategy instance
///
/// Each instance exclusively owns its state; nothing is shared between
/// instances, even on the same market. Calls on one instance are serialized
/// by its runner.
pub trait Strategy: Send + Sync {
    /// Instance id
    fn id(&self) -> &str;

    /// Market the instance trades
    fn market(&self) -> &str;

    /// Add a tick to the rolling window without evaluating
    fn observe(&mut self, tick: &MarketTick) -> Result<(), StrategyError>;

    /// Decide on at most one signal for the tick
    ///
    /// Re-evaluating an identical tick with no fill in between yields the
    /// same decision.
    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Result<Option<Signal>, StrategyError>;

    /// Record the confirmed fill of a signal
    fn apply_fill(&mut self, signal: &Signal, fill: &Fill) -> Result<(), StrategyError>;

    /// Samples needed before entries are considered
    fn required_history_length(&self) -> usize;

    /// Minimum tick-time between evaluations
    fn evaluation_interval(&self) -> chrono::Duration;

    fn serialize_state(&self) -> StrategyState;

    fn restore_state(&mut self, state: StrategyState) -> Result<(), StrategyError>;

    /// Operator action: lift suspension and reset the loss streak
    fn resume(&mut self);

    fn describe(&self) -> StrategyInfo;
}
