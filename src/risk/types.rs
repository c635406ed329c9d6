//! Risk management types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account and session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Realized loss per trading day that suspends the strategy
    pub daily_loss_limit: Decimal,
    /// Stop-loss exits in a row that suspend the strategy
    pub consecutive_loss_limit: u32,
    /// Minimum quote balance required to trade
    pub min_balance: Decimal,
    /// Largest share of available balance a single order may use
    pub max_position_fraction: Decimal,
    /// 24h volatility (percent) above which the strategy suspends
    pub volatility_cap: Decimal,
    /// Smallest order notional the exchange accepts
    pub min_order_amount: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(5000),
            consecutive_loss_limit: 3,
            min_balance: dec!(10000),
            max_position_fraction: dec!(0.10),
            volatility_cap: dec!(30),
            min_order_amount: dec!(5000),
        }
    }
}

/// Why a strategy instance stopped trading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspensionReason {
    /// Daily realized loss reached the limit
    DailyLossLimit { daily_pnl: Decimal, limit: Decimal },
    /// Too many stop-loss exits in a row
    ConsecutiveLosses { count: u32, limit: u32 },
    /// Quote balance below the trading minimum
    InsufficientBalance { balance: Decimal, required: Decimal },
    /// Market too volatile to enter
    ExcessiveVolatility { volatility: Decimal, cap: Decimal },
    /// Short-interval move fell through the market decline threshold
    MarketDecline { change: Decimal, threshold: Decimal },
}

impl SuspensionReason {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DailyLossLimit { .. } => "daily_loss_limit",
            Self::ConsecutiveLosses { .. } => "consecutive_losses",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::ExcessiveVolatility { .. } => "excessive_volatility",
            Self::MarketDecline { .. } => "market_decline",
        }
    }
}

impl fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLossLimit { daily_pnl, limit } => {
                write!(f, "daily loss limit reached: pnl {daily_pnl} <= -{limit}")
            }
            Self::ConsecutiveLosses { count, limit } => {
                write!(f, "consecutive losses: {count} >= {limit}")
            }
            Self::InsufficientBalance { balance, required } => {
                write!(f, "insufficient balance: {balance} < {required}")
            }
            Self::ExcessiveVolatility { volatility, cap } => {
                write!(f, "volatility {volatility}% above cap {cap}%")
            }
            Self::MarketDecline { change, threshold } => {
                write!(f, "market decline: {change}% <= {threshold}%")
            }
        }
    }
}

/// Outcome of a single gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskCheck {
    Allow,
    Deny(SuspensionReason),
}

impl RiskCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Inputs to the composed entry gate for one tick
#[derive(Debug, Clone)]
pub struct GateInput {
    pub is_suspended: bool,
    pub daily_pnl: Decimal,
    pub consecutive_losses: u32,
    /// Balance snapshot for this tick
    pub balance: Decimal,
    pub volatility: Decimal,
    /// Notional the strategy would like to buy
    pub desired_notional: Decimal,
}

/// Outcome of the composed entry gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Suspension flag already set
    Suspended,
    /// A gate failed; the instance must be suspended
    Deny(SuspensionReason),
    /// Clamped size is below the exchange minimum
    BelowMinimum { notional: Decimal },
    /// Entry allowed with the clamped notional
    Approved { notional: Decimal },
}
