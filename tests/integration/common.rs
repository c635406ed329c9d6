//! Shared fixtures

use async_trait::async_trait;
use avg_scalper::config::StrategyConfig;
use avg_scalper::execution::{
    ExecutionError, Fill, OrderExecutor, OrderId, OrderRequest, OrderSide, PaperEngine,
    RetryPolicy, RetryingExecutor,
};
use avg_scalper::feed::MarketTick;
use avg_scalper::persistence::JsonStateStore;
use avg_scalper::strategy::{StrategyFactory, StrategyRunner};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MARKET: &str = "KRW-BTC";

/// 2026-01-01T00:00:00Z plus `secs`
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
}

pub fn tick(price: Decimal, volume: Decimal, secs: i64) -> MarketTick {
    MarketTick::new(MARKET, price, volume, ts(secs))
}

/// Twenty flat ticks ten seconds apart, then a volume spike at 200s
pub fn entry_ticks() -> Vec<MarketTick> {
    let mut ticks: Vec<_> = (0..20).map(|i| tick(dec!(1000), dec!(1), i * 10)).collect();
    ticks.push(tick(dec!(1000), dec!(10), 200));
    ticks
}

pub fn strategy_config(id: &str) -> StrategyConfig {
    let mut config = StrategyConfig::new(id, MARKET);
    config.prioritized = true;
    config.params.target_profit = dec!(1.0);
    config
}

pub fn paper() -> Arc<PaperEngine> {
    Arc::new(PaperEngine::with_balance(dec!(0.0005), "KRW", dec!(10000000)))
}

pub fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1), 1)
}

pub fn runner(
    config: &StrategyConfig,
    executor: Arc<dyn OrderExecutor>,
    engine: Arc<PaperEngine>,
    store: Arc<JsonStateStore>,
) -> StrategyRunner {
    StrategyRunner::new(
        StrategyFactory::build(config).unwrap(),
        RetryingExecutor::new(executor, fast_policy(2), Duration::from_secs(1)),
        engine,
        store,
    )
}

/// Paper engine that fails selected orders and records every request
pub struct ScriptedExecutor {
    inner: Arc<PaperEngine>,
    /// Sells to fail with a transport error before letting one through
    failing_sells: AtomicU32,
    reject_buys: bool,
    pub requests: Mutex<Vec<OrderRequest>>,
}

impl ScriptedExecutor {
    pub fn new(inner: Arc<PaperEngine>) -> Self {
        Self {
            inner,
            failing_sells: AtomicU32::new(0),
            reject_buys: false,
            requests: Mutex::new(vec![]),
        }
    }

    pub fn failing_sells(self, count: u32) -> Self {
        self.failing_sells.store(count, Ordering::SeqCst);
        self
    }

    pub fn rejecting_buys(mut self) -> Self {
        self.reject_buys = true;
        self
    }

    pub fn sell_requests(&self) -> Vec<OrderRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.side == OrderSide::Sell)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderExecutor for ScriptedExecutor {
    async fn place(&self, request: &OrderRequest) -> Result<Fill, ExecutionError> {
        self.requests.lock().unwrap().push(request.clone());
        match request.side {
            OrderSide::Buy if self.reject_buys => {
                return Err(ExecutionError::Rejected("insufficient funds".into()));
            }
            OrderSide::Sell => {
                let failed = self
                    .failing_sells
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failed {
                    return Err(ExecutionError::Transport("connection reset".into()));
                }
            }
            OrderSide::Buy => {}
        }
        self.inner.place(request).await
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, ExecutionError> {
        self.inner.cancel(order_id).await
    }
}
