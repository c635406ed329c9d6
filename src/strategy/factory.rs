//! Strategy factory

use super::{StopLossAveragingStrategy, Strategy, StrategyError};
use crate::config::{Config, ConfigError, StrategyConfig, StrategyKind};
use std::collections::BTreeMap;

/// Builds strategy instances from configuration by id
#[derive(Debug, Clone, Default)]
pub struct StrategyFactory {
    configs: BTreeMap<String, StrategyConfig>,
}

impl StrategyFactory {
    /// Register configurations, rejecting duplicate ids
    pub fn new(configs: impl IntoIterator<Item = StrategyConfig>) -> Result<Self, StrategyError> {
        let mut map = BTreeMap::new();
        for config in configs {
            if map.contains_key(&config.id) {
                return Err(ConfigError::DuplicateStrategy(config.id).into());
            }
            map.insert(config.id.clone(), config);
        }
        Ok(Self { configs: map })
    }

    /// Factory over the enabled strategies of a loaded config
    pub fn from_config(config: &Config) -> Result<Self, StrategyError> {
        Self::new(config.enabled_strategies().cloned())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn config(&self, id: &str) -> Option<&StrategyConfig> {
        self.configs.get(id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Build a fresh instance for a registered id
    pub fn create(&self, id: &str) -> Result<Box<dyn Strategy>, StrategyError> {
        let config = self
            .configs
            .get(id)
            .ok_or_else(|| StrategyError::UnknownStrategy(id.to_string()))?;
        Self::build(config)
    }

    /// Build an instance straight from a configuration
    pub fn build(config: &StrategyConfig) -> Result<Box<dyn Strategy>, StrategyError> {
        let strategy: Box<dyn Strategy> = match config.kind {
            StrategyKind::StopLossAveraging => Box::new(StopLossAveragingStrategy::new(config)?),
        };
        tracing::debug!(
            strategy_id = %config.id,
            market = %config.market,
            kind = ?config.kind,
            "Strategy built"
        );
        Ok(strategy)
    }
}
