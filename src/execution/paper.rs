//! Paper trading execution engine

use super::{
    base_currency, quote_currency, BalanceProvider, ExecutionError, Fill, OrderExecutor, OrderId,
    OrderRequest, OrderSide,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Paper trading engine with simulated immediate fills
///
/// Market orders fill at the reference price, limit orders at their limit.
/// Keeps per-currency balances and a fill log.
#[derive(Clone)]
pub struct PaperEngine {
    fee_rate: Decimal,
    balances: Arc<RwLock<HashMap<String, Decimal>>>,
    fills: Arc<RwLock<Vec<Fill>>>,
}

impl PaperEngine {
    /// Create a new paper trading engine
    pub fn new(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            balances: Arc::new(RwLock::new(HashMap::new())),
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Create an engine seeded with one currency balance
    pub fn with_balance(fee_rate: Decimal, currency: &str, amount: Decimal) -> Self {
        let balances = HashMap::from([(currency.to_string(), amount)]);
        Self {
            fee_rate,
            balances: Arc::new(RwLock::new(balances)),
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Credit a currency balance
    pub async fn deposit(&self, currency: &str, amount: Decimal) {
        *self
            .balances
            .write()
            .await
            .entry(currency.to_string())
            .or_default() += amount;
    }

    /// All fills so far
    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl OrderExecutor for PaperEngine {
    async fn place(&self, request: &OrderRequest) -> Result<Fill, ExecutionError> {
        if request.quantity <= Decimal::ZERO {
            return Err(ExecutionError::Rejected(format!(
                "quantity {} must be positive",
                request.quantity
            )));
        }

        let price = request.expected_price();
        let notional = price * request.quantity;
        let fee = notional * self.fee_rate;
        let quote = quote_currency(&request.market).to_string();
        let base = base_currency(&request.market).to_string();

        {
            let mut balances = self.balances.write().await;
            let available = balances.get(&quote).copied().unwrap_or_default();
            match request.side {
                OrderSide::Buy => {
                    let required = notional + fee;
                    if available < required {
                        return Err(ExecutionError::Rejected(format!(
                            "insufficient {quote}: {available} < {required}"
                        )));
                    }
                    balances.insert(quote, available - required);
                    *balances.entry(base).or_default() += request.quantity;
                }
                OrderSide::Sell => {
                    let held = balances.get(&base).copied().unwrap_or_default();
                    if held < request.quantity {
                        return Err(ExecutionError::Rejected(format!(
                            "insufficient {base}: {held} < {}",
                            request.quantity
                        )));
                    }
                    balances.insert(base, held - request.quantity);
                    balances.insert(quote, available + notional - fee);
                }
            }
        }

        let fill = Fill {
            order_id: request.client_order_id,
            market: request.market.clone(),
            side: request.side,
            price,
            quantity: request.quantity,
            fee,
            timestamp: request.requested_at,
        };
        self.fills.write().await.push(fill.clone());

        tracing::info!(
            order = %fill.order_id,
            market = %fill.market,
            side = %fill.side,
            price = %fill.price,
            quantity = %fill.quantity,
            "Paper order filled"
        );
        Ok(fill)
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, ExecutionError> {
        // Paper orders fill on placement, so nothing is ever open
        tracing::info!(order = %order_id, "Paper cancel requested, no open order");
        Ok(false)
    }
}

#[async_trait]
impl BalanceProvider for PaperEngine {
    async fn balance(&self, currency: &str) -> Result<Decimal, ExecutionError> {
        Ok(self
            .balances
            .read()
            .await
            .get(currency)
            .copied()
            .unwrap_or_default())
    }
}
