//! Market data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed or incomplete market data
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Market identifier is empty
    #[error("Tick has no market identifier")]
    MissingMarket,
    /// Price is zero or negative
    #[error("Invalid tick price: {0}")]
    InvalidPrice(Decimal),
    /// Volume is negative
    #[error("Invalid tick volume: {0}")]
    InvalidVolume(Decimal),
    /// Daily reference is inconsistent
    #[error("Invalid daily reference: {0}")]
    InvalidReference(String),
    /// Line could not be decoded
    #[error("Malformed tick: {0}")]
    Malformed(String),
    /// Older than a tick already taken into the window
    #[error("Tick at {timestamp} is older than the newest sample at {newest}")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        newest: DateTime<Utc>,
    },
}

/// Exchange-provided 24h reference figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReference {
    /// Previous closing price (range denominator)
    pub reference_price: Decimal,
    /// 24h high
    pub high_price: Decimal,
    /// 24h low
    pub low_price: Decimal,
    /// Accumulated 24h volume
    #[serde(default)]
    pub volume_24h: Decimal,
}

/// A single market observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    /// Market code (e.g., "KRW-BTC")
    pub market: String,
    /// Last trade price
    pub price: Decimal,
    /// Volume traded in the interval ending at this tick
    pub volume: Decimal,
    /// Exchange timestamp
    pub timestamp: DateTime<Utc>,
    /// 24h reference, when the exchange supplies one
    #[serde(default)]
    pub daily: Option<DailyReference>,
}

impl MarketTick {
    /// Create a tick without a daily reference
    pub fn new(
        market: impl Into<String>,
        price: Decimal,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            market: market.into(),
            price,
            volume,
            timestamp,
            daily: None,
        }
    }

    /// Attach a daily reference
    pub fn with_daily(mut self, daily: DailyReference) -> Self {
        self.daily = Some(daily);
        self
    }

    /// Check required fields
    pub fn validate(&self) -> Result<(), InputError> {
        if self.market.trim().is_empty() {
            return Err(InputError::MissingMarket);
        }
        if self.price <= Decimal::ZERO {
            return Err(InputError::InvalidPrice(self.price));
        }
        if self.volume < Decimal::ZERO {
            return Err(InputError::InvalidVolume(self.volume));
        }
        if let Some(daily) = &self.daily {
            if daily.reference_price <= Decimal::ZERO {
                return Err(InputError::InvalidReference(format!(
                    "reference price {}",
                    daily.reference_price
                )));
            }
            if daily.high_price < daily.low_price {
                return Err(InputError::InvalidReference(format!(
                    "high {} below low {}",
                    daily.high_price, daily.low_price
                )));
            }
        }
        Ok(())
    }
}
