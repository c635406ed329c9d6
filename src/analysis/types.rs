//! Analysis types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Window shorter than the indicator period
    #[error("Insufficient history: need {required} samples, have {available}")]
    InsufficientHistory { required: usize, available: usize },
}

/// Short-window price direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Regime snapshot recomputed every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    /// 24h range as a percentage of the reference price
    pub volatility_24h: Decimal,
    /// Current volume over the lookback average
    pub volume_ratio: Decimal,
    /// Relative strength index, 0 to 100
    pub rsi: Decimal,
    /// Percentage change over the short interval
    pub price_change_1m: Decimal,
    /// Short-window trend
    pub market_trend: MarketTrend,
    /// Short-interval change at or below the decline threshold
    pub is_rapid_decline: bool,
}

impl MarketConditions {
    /// Neutral defaults used when history is too short
    pub fn neutral() -> Self {
        Self {
            volatility_24h: dec!(0),
            volume_ratio: dec!(1),
            rsi: dec!(50),
            price_change_1m: dec!(0),
            market_trend: MarketTrend::Neutral,
            is_rapid_decline: false,
        }
    }
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self::neutral()
    }
}
