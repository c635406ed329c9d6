//! Strategy state persistence
//!
//! Snapshots are written on fills and on graceful shutdown, and read back
//! when a runner starts.

mod json;

pub use json::JsonStateStore;

use crate::strategy::StrategyState;
use async_trait::async_trait;
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("State I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("State encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid strategy id for storage: {0}")]
    InvalidId(String),
}

/// Stores one state snapshot per strategy id
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_state(
        &self,
        strategy_id: &str,
        state: &StrategyState,
    ) -> Result<(), PersistenceError>;

    async fn load_state(&self, strategy_id: &str) -> Result<Option<StrategyState>, PersistenceError>;
}
