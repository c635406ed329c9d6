//! Market data feed module
//!
//! Tick types and the feed abstraction strategies consume

mod replay;
mod types;

pub use replay::ReplayFeed;
pub use types::{DailyReference, InputError, MarketTick};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for market data feed implementations
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Subscribe to tick updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<MarketTick>>;
}
