//! JSON file state store

use super::{PersistenceError, StateStore};
use crate::strategy::StrategyState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One pretty-printed JSON file per strategy id under a directory
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, strategy_id: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !strategy_id.is_empty()
            && !strategy_id.starts_with('.')
            && !strategy_id.contains(['/', '\\']);
        if !valid {
            return Err(PersistenceError::InvalidId(strategy_id.to_string()));
        }
        Ok(self.dir.join(format!("{strategy_id}.json")))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn save_state(
        &self,
        strategy_id: &str,
        state: &StrategyState,
    ) -> Result<(), PersistenceError> {
        let path = self.path_for(strategy_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Readers only ever see a complete snapshot
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(strategy_id, path = %path.display(), "State saved");
        Ok(())
    }

    async fn load_state(&self, strategy_id: &str) -> Result<Option<StrategyState>, PersistenceError> {
        let path = self.path_for(strategy_id)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
