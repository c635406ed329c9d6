//! Strategy types

use crate::analysis::MarketConditions;
use crate::config::{ConfigError, StrategyParams};
use crate::execution::{OrderRequest, OrderSide, OrderType};
use crate::exit::{Milestone, TrailingState};
use crate::feed::{InputError, MarketTick};
use crate::position::{Position, PositionError, PositionStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Strategy errors
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Tick failed validation; skipped without touching state
    #[error("Invalid tick: {0}")]
    Input(#[from] InputError),
    /// Position bookkeeping rejected a fill
    #[error("Position error: {0}")]
    Position(#[from] PositionError),
    #[error("Fill for {got} does not match strategy market {expected}")]
    MarketMismatch { expected: String, got: String },
    #[error("Fill does not match signal: {0}")]
    FillMismatch(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// Why a signal was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    InitialBuy,
    Averaging,
    PartialSell,
    StopLoss,
    TrailingStop,
    BreakevenExit,
}

impl SignalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialBuy => "initial_buy",
            Self::Averaging => "averaging",
            Self::PartialSell => "partial_sell",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::BreakevenExit => "breakeven_exit",
        }
    }

    /// Order side the reason implies
    pub fn side(&self) -> OrderSide {
        match self {
            Self::InitialBuy | Self::Averaging => OrderSide::Buy,
            _ => OrderSide::Sell,
        }
    }

    /// Fixed confidence of exit and averaging signals
    pub fn fixed_confidence(&self) -> Option<Decimal> {
        match self {
            Self::InitialBuy => None,
            Self::Averaging => Some(dec!(0.7)),
            Self::PartialSell => Some(dec!(0.8)),
            Self::BreakevenExit => Some(dec!(0.9)),
            Self::StopLoss | Self::TrailingStop => Some(dec!(1.0)),
        }
    }

    /// Exits that must go out as market orders
    pub fn is_protective(&self) -> bool {
        matches!(
            self,
            Self::StopLoss | Self::TrailingStop | Self::BreakevenExit
        )
    }
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trading decision for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Derived from the instance, tick time, reason and rung
    pub id: Uuid,
    pub strategy_id: String,
    pub market: String,
    pub action: OrderSide,
    pub reason: SignalReason,
    /// Base-currency quantity
    pub quantity: Decimal,
    /// Tick price the decision was made at
    pub price: Decimal,
    pub order_type: OrderType,
    /// 0 to 1
    pub confidence: Decimal,
    pub position_snapshot: PositionStatus,
    pub market_conditions: MarketConditions,
    /// Net pnl the sell would realize at `price`; `None` for buys
    pub expected_pnl: Option<Decimal>,
    /// Ladder rung behind a partial sell
    pub milestone: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Order for this signal; the signal id doubles as client order id
    pub fn order_request(&self) -> OrderRequest {
        OrderRequest {
            client_order_id: self.id,
            market: self.market.clone(),
            side: self.action,
            order_type: self.order_type,
            price: match self.order_type {
                OrderType::Limit => Some(self.price),
                OrderType::Market => None,
            },
            reference_price: self.price,
            quantity: self.quantity,
            requested_at: self.timestamp,
        }
    }

    /// Notional at the signal price
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// An applied fill, kept for the current trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub market: String,
    pub side: OrderSide,
    pub reason: SignalReason,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    /// Zero for buys
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Persistable state of one strategy instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub strategy_id: String,
    pub market: String,
    pub position: Option<Position>,
    pub consecutive_losses: u32,
    /// Realized pnl of the current trading day
    pub daily_pnl: Decimal,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Ladder rungs filled for the open position
    #[serde(default)]
    pub completed_milestones: Vec<usize>,
    /// Set by a partial-sell fill; the remainder exits at breakeven
    #[serde(default)]
    pub stop_raised_to_breakeven: bool,
    #[serde(default)]
    pub trailing: TrailingState,
    /// Trading day `daily_pnl` and `daily_trades` belong to
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub daily_trades: Vec<TradeRecord>,
}

impl StrategyState {
    /// Fresh state with no position
    pub fn new(strategy_id: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            market: market.into(),
            position: None,
            consecutive_losses: 0,
            daily_pnl: dec!(0),
            is_suspended: false,
            suspension_reason: None,
            last_trade_time: None,
            completed_milestones: vec![],
            stop_raised_to_breakeven: false,
            trailing: TrailingState::default(),
            session_date: None,
            daily_trades: vec![],
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::derive(
            self.position.as_ref(),
            &self.completed_milestones,
            self.trailing.activated,
        )
    }
}

/// Lifecycle phase, derived from state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No position
    Idle,
    /// Initial entry held
    Positioned,
    /// One or more averaging entries made
    Averaging,
    /// At least one milestone sold
    PartialExiting,
    /// Trailing stop armed
    Trailing,
}

impl Phase {
    pub fn derive(
        position: Option<&Position>,
        completed_milestones: &[usize],
        trailing_active: bool,
    ) -> Self {
        match position {
            None => Self::Idle,
            Some(_) if trailing_active => Self::Trailing,
            Some(_) if !completed_milestones.is_empty() => Self::PartialExiting,
            Some(p) if p.averaging_count() > 0 => Self::Averaging,
            Some(_) => Self::Positioned,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Positioned => "positioned",
            Self::Averaging => "averaging",
            Self::PartialExiting => "partial_exiting",
            Self::Trailing => "trailing",
        };
        f.write_str(s)
    }
}

/// Inputs to one evaluation
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub tick: &'a MarketTick,
    /// Quote balance snapshot, valid for this tick only
    pub available_balance: Decimal,
}

/// Operator-facing summary of an instance
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub id: String,
    pub market: String,
    pub kind: &'static str,
    pub phase: Phase,
    pub prioritized: bool,
    pub params: StrategyParams,
    pub position: PositionStatus,
    pub breakeven_price: Option<Decimal>,
    pub consecutive_losses: u32,
    pub daily_pnl: Decimal,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub completed_milestones: Vec<usize>,
    pub next_milestone: Option<Milestone>,
    pub remaining_quantity_ratio: Decimal,
    pub stop_raised_to_breakeven: bool,
    pub trailing_activation_price: Option<Decimal>,
    pub trailing_high_water_price: Option<Decimal>,
    pub trailing_stop_price: Option<Decimal>,
    pub required_history_length: usize,
}
