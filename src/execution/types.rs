//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price specified)
    Limit,
}

/// Order placement failures
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Exchange refused the order
    #[error("Order rejected: {0}")]
    Rejected(String),
    /// No answer within the per-attempt timeout
    #[error("Order timed out after {0:?}")]
    Timeout(Duration),
    /// Network or transport failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Every attempt failed
    #[error("Order failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ExecutionError>,
    },
}

impl ExecutionError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// An order to be placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-side id, stable across retries
    pub client_order_id: OrderId,
    /// Market code
    pub market: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders
    pub price: Option<Decimal>,
    /// Last observed price, used to size and simulate market orders
    pub reference_price: Decimal,
    /// Base-currency quantity
    pub quantity: Decimal,
    /// Time of the tick that produced the order
    pub requested_at: DateTime<Utc>,
}

impl OrderRequest {
    /// Price the order is expected to fill at
    pub fn expected_price(&self) -> Decimal {
        self.price.unwrap_or(self.reference_price)
    }

    /// Quote-currency value of the order
    pub fn notional(&self) -> Decimal {
        self.expected_price() * self.quantity
    }

    /// Same order as an immediate market order
    pub fn into_market(mut self) -> Self {
        self.order_type = OrderType::Market;
        self.price = None;
        self
    }
}

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Exchange order id
    pub order_id: OrderId,
    /// Market code
    pub market: String,
    /// Trade side
    pub side: OrderSide,
    /// Fill price
    pub price: Decimal,
    /// Filled quantity
    pub quantity: Decimal,
    /// Fees paid in quote currency
    pub fee: Decimal,
    /// Fill timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            client_order_id: Uuid::new_v4(),
            market: "KRW-BTC".to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: Some(dec!(1005)),
            reference_price: dec!(1004),
            quantity: dec!(30),
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_price_prefers_limit() {
        let r = request();
        assert_eq!(r.expected_price(), dec!(1005));
        assert_eq!(r.notional(), dec!(30150));
    }

    #[test]
    fn test_into_market_drops_limit_price() {
        let r = request().into_market();
        assert_eq!(r.order_type, OrderType::Market);
        assert_eq!(r.price, None);
        assert_eq!(r.expected_price(), dec!(1004));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ExecutionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ExecutionError::Transport("reset".into()).is_retryable());
        assert!(!ExecutionError::Rejected("min size".into()).is_retryable());
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"buy\"");
        assert_eq!(OrderSide::Sell.to_string(), "sell");
    }
}
