//! Market regime analysis module
//!
//! Derives volatility, volume, RSI and trend signals from a rolling window

mod analyzer;
mod history;
mod types;

pub use analyzer::{AnalyzerConfig, MarketAnalyzer};
pub use history::{PriceHistory, PriceSample};
pub use types::{AnalysisError, MarketConditions, MarketTrend};
