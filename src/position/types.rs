//! Position types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position bookkeeping errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    /// Quantity is zero or negative
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),
    /// Price is zero or negative
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
    /// Sell larger than the held quantity
    #[error("Insufficient position: requested {requested}, held {available}")]
    InsufficientPosition {
        requested: Decimal,
        available: Decimal,
    },
    /// Averaging or selling with nothing held
    #[error("No open position")]
    NoPosition,
    /// Initial entry while a position is already open
    #[error("Position already open")]
    AlreadyOpen,
}

/// Kind of buy that opened or extended the position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Initial,
    Averaging,
}

/// A recorded buy fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub price: Decimal,
    pub quantity: Decimal,
    /// price * quantity
    pub cost: Decimal,
    pub kind: EntryKind,
    pub timestamp: DateTime<Utc>,
}

/// A recorded sell against the position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedSlice {
    pub price: Decimal,
    pub quantity: Decimal,
    /// Net of both fee legs
    pub pnl: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Market code
    pub market: String,
    /// Buy fills in entry order
    pub entries: Vec<PositionEntry>,
    /// total_cost / total_quantity
    pub average_price: Decimal,
    /// Quantity still held
    pub total_quantity: Decimal,
    /// Cost basis of the quantity still held
    pub total_cost: Decimal,
    /// Sells made against this position
    pub realized: Vec<RealizedSlice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Number of averaging entries
    pub fn averaging_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Averaging)
            .count()
    }

    /// The entry that opened the position
    pub fn initial_entry(&self) -> Option<&PositionEntry> {
        self.entries.first()
    }

    /// Total quantity sold so far
    pub fn realized_quantity(&self) -> Decimal {
        self.realized.iter().map(|r| r.quantity).sum()
    }

    /// Total realized pnl so far
    pub fn realized_pnl(&self) -> Decimal {
        self.realized.iter().map(|r| r.pnl).sum()
    }
}

/// Read-only position summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStatus {
    pub average_price: Decimal,
    pub total_quantity: Decimal,
    pub entry_count: usize,
    pub averaging_count: usize,
}

impl PositionStatus {
    pub fn empty() -> Self {
        Self {
            average_price: dec!(0),
            total_quantity: dec!(0),
            entry_count: 0,
            averaging_count: 0,
        }
    }
}

/// Unrealized pnl, fee-adjusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pnl {
    pub absolute: Decimal,
    /// Percent points of the fee-inclusive cost basis
    pub percent: Decimal,
}

/// Result of a sell applied to the position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellOutcome {
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    /// The sell closed the position
    pub closed: bool,
}

/// Per-side fee rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub buy_fee_rate: Decimal,
    pub sell_fee_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(buy_fee_rate: Decimal, sell_fee_rate: Decimal) -> Self {
        Self {
            buy_fee_rate,
            sell_fee_rate,
        }
    }

    /// Price at which a round trip from `average_price` nets zero
    pub fn breakeven_price(&self, average_price: Decimal) -> Decimal {
        average_price * (Decimal::ONE + self.buy_fee_rate) * (Decimal::ONE + self.sell_fee_rate)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            buy_fee_rate: dec!(0.0005),
            sell_fee_rate: dec!(0.0005),
        }
    }
}
