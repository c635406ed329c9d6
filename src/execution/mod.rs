//! Execution module
//!
//! Order placement collaborators: the executor and balance traits, the
//! retry wrapper and the paper engine

mod paper;
mod retry;
mod types;

pub use paper::PaperEngine;
pub use retry::{RetryPolicy, RetryingExecutor};
pub use types::{ExecutionError, Fill, OrderId, OrderRequest, OrderSide, OrderType};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Places and cancels orders on an exchange
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Place an order and wait for its fill
    async fn place(&self, request: &OrderRequest) -> Result<Fill, ExecutionError>;
    /// Cancel an open order; `false` when nothing was open
    async fn cancel(&self, order_id: OrderId) -> Result<bool, ExecutionError>;
}

/// Account balance accessor
///
/// Implementations synchronize internally; callers treat each read as a
/// snapshot for the current tick.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn balance(&self, currency: &str) -> Result<Decimal, ExecutionError>;
}

/// Quote currency of a market code ("KRW-BTC" -> "KRW")
pub fn quote_currency(market: &str) -> &str {
    market.split('-').next().unwrap_or(market)
}

/// Base currency of a market code ("KRW-BTC" -> "BTC")
pub fn base_currency(market: &str) -> &str {
    market.split_once('-').map_or(market, |(_, base)| base)
}
