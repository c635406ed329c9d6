//! Configuration types for avg-scalper
//!
//! Percentages are percent points (-3.0 = -3%); fee rates and the position
//! fraction are plain fractions (0.0005 = 0.05%).

use crate::analysis::AnalyzerConfig;
use crate::exit::{Milestone, TrailingConfig};
use crate::execution::RetryPolicy;
use crate::position::FeeSchedule;
use crate::risk::RiskLimits;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("Duplicate strategy id: {0}")]
    DuplicateStrategy(String),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_range<T: PartialOrd + Display>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(invalid(field, format!("{value} not in [{min}, {max}]")));
    }
    Ok(())
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telemetry: TelemetryConfig,
    pub feed: FeedConfig,
    pub execution: ExecutionConfig,
    pub persistence: PersistenceConfig,
    pub strategies: Vec<StrategyConfig>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

/// Market data feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// JSON-lines tick file replayed by `run`
    pub replay_path: Option<PathBuf>,
    /// Per-subscriber channel capacity
    pub channel_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            replay_path: None,
            channel_size: 1024,
        }
    }
}

/// Order execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Paper engine fee rate per side
    pub fee_rate: Decimal,
    /// Paper engine starting quote balance
    pub initial_balance: Decimal,
    /// Currency the starting balance is held in
    pub quote_currency: String,
    /// Per-attempt order timeout
    pub order_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.0005),
            initial_balance: dec!(10000000),
            quote_currency: "KRW".to_string(),
            order_timeout_ms: 5000,
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }
}

/// Retry policy for transient order failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
        )
    }
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding one JSON snapshot per strategy id
    pub state_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./state"),
        }
    }
}

/// Strategy implementation selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    StopLossAveraging,
}

fn default_true() -> bool {
    true
}

/// One strategy instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Unique instance id, also the persistence key
    pub id: String,
    /// Market code (e.g., "KRW-BTC")
    pub market: String,
    #[serde(default)]
    pub kind: StrategyKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prioritized coins skip the minimum-volatility entry condition
    #[serde(default)]
    pub prioritized: bool,
    #[serde(default)]
    pub params: StrategyParams,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub risk: RiskLimits,
}

impl StrategyConfig {
    /// Create an enabled instance with default parameters
    pub fn new(id: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            market: market.into(),
            kind: StrategyKind::default(),
            enabled: true,
            prioritized: false,
            params: StrategyParams::default(),
            analyzer: AnalyzerConfig::default(),
            risk: RiskLimits::default(),
        }
    }

    /// Validate every section of the instance
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = format!("strategies[{}]", self.id);
        if self.id.trim().is_empty() {
            return Err(invalid("strategies.id", "must not be empty"));
        }
        if self.id.contains(['/', '\\']) || self.id.starts_with('.') {
            return Err(invalid(format!("{prefix}.id"), "must be a plain file name"));
        }
        if !self.market.contains('-') {
            return Err(invalid(
                format!("{prefix}.market"),
                format!("{} is not QUOTE-BASE", self.market),
            ));
        }

        self.params.validate(&format!("{prefix}.params"))?;
        validate_risk(&self.risk, &format!("{prefix}.risk"))?;
        validate_analyzer(&self.analyzer, &format!("{prefix}.analyzer"))
    }
}

/// Decision parameters of the stop-loss averaging strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Net pnl percent that liquidates the whole position
    pub stop_loss_level: Decimal,
    /// Net pnl percent that triggers an averaging buy
    pub averaging_trigger: Decimal,
    /// Fee-inclusive target profit percent
    pub target_profit: Decimal,
    pub max_averaging_count: u32,
    /// Minimum tick-time between evaluations
    pub evaluation_interval_secs: u64,
    /// Desired quote notional of the initial entry, before clamping
    pub initial_order_amount: Decimal,
    /// Trailing stop arms at this multiple of the target
    pub trailing_trigger_multiple: Decimal,
    /// Retracement from the high that fires the trailing stop, percent
    pub trailing_trail_percentage: Decimal,
    pub partial_sell_ladder: Vec<Milestone>,
    pub buy_fee_rate: Decimal,
    pub sell_fee_rate: Decimal,
    /// Place buys and partial sells as limit orders at the tick price
    pub limit_orders: bool,
    /// UTC offset of the trading day boundary (KST = 9)
    pub trading_day_offset_hours: i32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            stop_loss_level: dec!(-3.0),
            averaging_trigger: dec!(-1.0),
            target_profit: dec!(0.5),
            max_averaging_count: 1,
            evaluation_interval_secs: 10,
            initial_order_amount: dec!(100000),
            trailing_trigger_multiple: dec!(1.5),
            trailing_trail_percentage: dec!(1.0),
            partial_sell_ladder: Milestone::default_ladder(),
            buy_fee_rate: dec!(0.0005),
            sell_fee_rate: dec!(0.0005),
            limit_orders: false,
            trading_day_offset_hours: 9,
        }
    }
}

impl StrategyParams {
    pub fn fees(&self) -> FeeSchedule {
        FeeSchedule::new(self.buy_fee_rate, self.sell_fee_rate)
    }

    pub fn trailing(&self) -> TrailingConfig {
        TrailingConfig {
            target_profit: self.target_profit,
            trigger_multiple: self.trailing_trigger_multiple,
            trail_percentage: self.trailing_trail_percentage,
        }
    }

    pub fn evaluation_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.evaluation_interval_secs as i64)
    }

    /// Check every parameter against its allowed range
    pub fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        let field = |name: &str| format!("{prefix}.{name}");

        check_range(
            &field("stop_loss_level"),
            self.stop_loss_level,
            dec!(-5),
            dec!(-1),
        )?;
        check_range(
            &field("averaging_trigger"),
            self.averaging_trigger,
            dec!(-2),
            dec!(-0.5),
        )?;
        if self.stop_loss_level >= self.averaging_trigger {
            return Err(invalid(
                field("stop_loss_level"),
                format!(
                    "{} must be below averaging_trigger {}",
                    self.stop_loss_level, self.averaging_trigger
                ),
            ));
        }
        check_range(
            &field("target_profit"),
            self.target_profit,
            dec!(0.2),
            dec!(2),
        )?;
        check_range(
            &field("evaluation_interval_secs"),
            self.evaluation_interval_secs,
            5,
            60,
        )?;
        check_range(
            &field("max_averaging_count"),
            self.max_averaging_count,
            1,
            3,
        )?;
        if self.initial_order_amount <= Decimal::ZERO {
            return Err(invalid(field("initial_order_amount"), "must be positive"));
        }
        if self.trailing_trigger_multiple <= Decimal::ONE {
            return Err(invalid(
                field("trailing_trigger_multiple"),
                format!("{} must exceed 1", self.trailing_trigger_multiple),
            ));
        }
        if self.trailing_trail_percentage <= Decimal::ZERO
            || self.trailing_trail_percentage > dec!(10)
        {
            return Err(invalid(
                field("trailing_trail_percentage"),
                format!("{} not in (0, 10]", self.trailing_trail_percentage),
            ));
        }
        for (name, rate) in [
            ("buy_fee_rate", self.buy_fee_rate),
            ("sell_fee_rate", self.sell_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= dec!(0.01) {
                return Err(invalid(field(name), format!("{rate} not in [0, 0.01)")));
            }
        }
        check_range(
            &field("trading_day_offset_hours"),
            self.trading_day_offset_hours,
            -12,
            14,
        )?;

        validate_ladder(&self.partial_sell_ladder, &field("partial_sell_ladder"))
    }
}

fn validate_ladder(ladder: &[Milestone], field: &str) -> Result<(), ConfigError> {
    let mut previous = Decimal::ZERO;
    for (i, milestone) in ladder.iter().enumerate() {
        if milestone.target_fraction <= previous {
            return Err(invalid(
                format!("{field}[{i}].target_fraction"),
                format!(
                    "{} must be positive and above the previous rung",
                    milestone.target_fraction
                ),
            ));
        }
        if milestone.sell_fraction <= Decimal::ZERO || milestone.sell_fraction > Decimal::ONE {
            return Err(invalid(
                format!("{field}[{i}].sell_fraction"),
                format!("{} not in (0, 1]", milestone.sell_fraction),
            ));
        }
        previous = milestone.target_fraction;
    }
    Ok(())
}

fn validate_risk(risk: &RiskLimits, prefix: &str) -> Result<(), ConfigError> {
    if risk.max_position_fraction <= Decimal::ZERO || risk.max_position_fraction > Decimal::ONE {
        return Err(invalid(
            format!("{prefix}.max_position_fraction"),
            format!("{} not in (0, 1]", risk.max_position_fraction),
        ));
    }
    if risk.daily_loss_limit <= Decimal::ZERO {
        return Err(invalid(format!("{prefix}.daily_loss_limit"), "must be positive"));
    }
    if risk.consecutive_loss_limit == 0 {
        return Err(invalid(
            format!("{prefix}.consecutive_loss_limit"),
            "must be at least 1",
        ));
    }
    if risk.min_balance < Decimal::ZERO || risk.min_order_amount < Decimal::ZERO {
        return Err(invalid(prefix, "balances must not be negative"));
    }
    if risk.volatility_cap <= Decimal::ZERO {
        return Err(invalid(format!("{prefix}.volatility_cap"), "must be positive"));
    }
    Ok(())
}

fn validate_analyzer(analyzer: &AnalyzerConfig, prefix: &str) -> Result<(), ConfigError> {
    if analyzer.rsi_period == 0 {
        return Err(invalid(format!("{prefix}.rsi_period"), "must be at least 1"));
    }
    if analyzer.volume_lookback == 0 {
        return Err(invalid(
            format!("{prefix}.volume_lookback"),
            "must be at least 1",
        ));
    }
    let required = (analyzer.rsi_period + 1).max(analyzer.trend_window);
    if analyzer.history_capacity < required {
        return Err(invalid(
            format!("{prefix}.history_capacity"),
            format!(
                "{} is shorter than the {required} samples the indicators need",
                analyzer.history_capacity
            ),
        ));
    }
    if analyzer.rapid_decline_threshold >= Decimal::ZERO {
        return Err(invalid(
            format!("{prefix}.rapid_decline_threshold"),
            "must be negative",
        ));
    }
    if analyzer.market_decline_threshold >= Decimal::ZERO {
        return Err(invalid(
            format!("{prefix}.market_decline_threshold"),
            "must be negative",
        ));
    }
    Ok(())
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.fee_rate < Decimal::ZERO || self.execution.fee_rate >= dec!(0.01) {
            return Err(invalid(
                "execution.fee_rate",
                format!("{} not in [0, 0.01)", self.execution.fee_rate),
            ));
        }
        if self.execution.retry.max_attempts == 0 {
            return Err(invalid("execution.retry.max_attempts", "must be at least 1"));
        }
        if self.execution.order_timeout_ms == 0 {
            return Err(invalid("execution.order_timeout_ms", "must be positive"));
        }
        if self.feed.channel_size == 0 {
            return Err(invalid("feed.channel_size", "must be positive"));
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy.id.as_str()) {
                return Err(ConfigError::DuplicateStrategy(strategy.id.clone()));
            }
            strategy.validate()?;
        }
        Ok(())
    }

    /// Strategies marked enabled
    pub fn enabled_strategies(&self) -> impl Iterator<Item = &StrategyConfig> {
        self.strategies.iter().filter(|s| s.enabled)
    }
}
