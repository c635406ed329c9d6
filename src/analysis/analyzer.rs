//! Market analyzer
//!
//! Every indicator is a pure function of the window passed in, so the same
//! window always yields the same [`MarketConditions`].

use super::{AnalysisError, MarketConditions, MarketTrend, PriceHistory};
use crate::feed::DailyReference;
use crate::risk::SuspensionReason;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Analyzer thresholds and window sizes
///
/// Percentages are expressed in percent points (5.0 = 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Maximum samples kept in the rolling window
    pub history_capacity: usize,
    /// RSI period
    pub rsi_period: usize,
    /// Samples averaged for the volume ratio
    pub volume_lookback: usize,
    /// Minimum 24h volatility for entry
    pub volatility_threshold: Decimal,
    /// Minimum volume ratio for entry
    pub volume_ratio_threshold: Decimal,
    /// Short-interval change at or below which the market is in rapid decline
    pub rapid_decline_threshold: Decimal,
    /// Short interval length
    pub rapid_decline_window_secs: u64,
    /// Short-interval change at or below which the strategy suspends
    pub market_decline_threshold: Decimal,
    /// Samples used for trend detection
    pub trend_window: usize,
    /// Absolute change beyond which the trend is bullish/bearish
    pub trend_band: Decimal,
    /// RSI at or below which the market is oversold
    pub rsi_oversold: Decimal,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            rsi_period: 14,
            volume_lookback: 20,
            volatility_threshold: dec!(5.0),
            volume_ratio_threshold: dec!(1.5),
            rapid_decline_threshold: dec!(-2.0),
            rapid_decline_window_secs: 60,
            market_decline_threshold: dec!(-3.0),
            trend_window: 5,
            trend_band: dec!(3.0),
            rsi_oversold: dec!(30),
        }
    }
}

/// Derives regime snapshots from a price window
#[derive(Debug, Clone)]
pub struct MarketAnalyzer {
    config: AnalyzerConfig,
}

impl MarketAnalyzer {
    /// Create a new analyzer
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Samples needed before every indicator is computed from real data
    pub fn required_history_length(&self) -> usize {
        (self.config.rsi_period + 1).max(self.config.trend_window)
    }

    /// Compute the full regime snapshot
    pub fn analyze(
        &self,
        history: &PriceHistory,
        daily: Option<&DailyReference>,
    ) -> MarketConditions {
        if history.is_empty() {
            return MarketConditions::neutral();
        }

        let rsi = match Self::rsi(&history.prices(), self.config.rsi_period) {
            Ok(rsi) => rsi,
            Err(e) => {
                tracing::debug!(error = %e, "RSI unavailable, using neutral value");
                dec!(50)
            }
        };

        let price_change_1m = self.price_change(history);

        MarketConditions {
            volatility_24h: Self::volatility_24h(history, daily),
            volume_ratio: self.volume_ratio(history),
            rsi,
            price_change_1m,
            market_trend: self.trend(history),
            is_rapid_decline: price_change_1m <= self.config.rapid_decline_threshold,
        }
    }

    /// 24h range over the reference price, in percent
    ///
    /// Uses the exchange's daily figures when present, otherwise the
    /// high/low of the samples in the trailing 24h against the oldest one.
    pub fn volatility_24h(history: &PriceHistory, daily: Option<&DailyReference>) -> Decimal {
        if let Some(daily) = daily {
            if daily.reference_price.is_zero() {
                return dec!(0);
            }
            return (daily.high_price - daily.low_price) / daily.reference_price * dec!(100);
        }

        let mut window = history.within(Duration::hours(24));
        let Some(first) = window.next() else {
            return dec!(0);
        };
        let reference = first.price;
        let (low, high) = window.fold((first.price, first.price), |(lo, hi), s| {
            (lo.min(s.price), hi.max(s.price))
        });

        if reference.is_zero() {
            return dec!(0);
        }
        (high - low) / reference * dec!(100)
    }

    /// Current volume over the average of the preceding lookback samples
    pub fn volume_ratio(&self, history: &PriceHistory) -> Decimal {
        let Some(current) = history.latest() else {
            return dec!(1);
        };

        let previous: Vec<Decimal> = history
            .iter()
            .rev()
            .skip(1)
            .take(self.config.volume_lookback)
            .map(|s| s.volume)
            .collect();

        if previous.is_empty() {
            return dec!(1);
        }

        let average = previous.iter().sum::<Decimal>() / Decimal::from(previous.len());
        if average.is_zero() {
            return dec!(1);
        }
        current.volume / average
    }

    /// Classic RSI over the last `period` price changes
    pub fn rsi(prices: &[Decimal], period: usize) -> Result<Decimal, AnalysisError> {
        if period == 0 || prices.len() < period + 1 {
            return Err(AnalysisError::InsufficientHistory {
                required: period + 1,
                available: prices.len(),
            });
        }

        let recent = &prices[prices.len() - (period + 1)..];
        let (gains, losses) = recent
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((dec!(0), dec!(0)), |(g, l), change| {
                if change > dec!(0) {
                    (g + change, l)
                } else {
                    (g, l - change)
                }
            });

        if losses.is_zero() {
            return Ok(dec!(100));
        }
        if gains.is_zero() {
            return Ok(dec!(0));
        }

        let n = Decimal::from(period);
        let rs = (gains / n) / (losses / n);
        let rsi = dec!(100) - dec!(100) / (dec!(1) + rs);
        Ok(rsi.max(dec!(0)).min(dec!(100)))
    }

    /// Percentage change of the newest price over the short interval
    pub fn price_change(&self, history: &PriceHistory) -> Decimal {
        let window = Duration::seconds(self.config.rapid_decline_window_secs as i64);
        match (history.latest(), history.sample_before(window)) {
            (Some(latest), Some(earlier)) if !earlier.price.is_zero() => {
                (latest.price - earlier.price) / earlier.price * dec!(100)
            }
            _ => dec!(0),
        }
    }

    /// Trend from the aggregate change across the trend window
    pub fn trend(&self, history: &PriceHistory) -> MarketTrend {
        let n = self.config.trend_window;
        if n < 2 || history.len() < n {
            return MarketTrend::Neutral;
        }

        let recent: Vec<Decimal> = history.iter().rev().take(n).map(|s| s.price).collect();
        let (newest, oldest) = (recent[0], recent[n - 1]);
        if oldest.is_zero() {
            return MarketTrend::Neutral;
        }

        let change = (newest - oldest) / oldest * dec!(100);
        if change >= self.config.trend_band {
            MarketTrend::Bullish
        } else if change <= -self.config.trend_band {
            MarketTrend::Bearish
        } else {
            MarketTrend::Neutral
        }
    }

    /// Entry gate on the regime snapshot
    pub fn allows_entry(&self, conditions: &MarketConditions, prioritized: bool) -> bool {
        let volatile = prioritized || conditions.volatility_24h >= self.config.volatility_threshold;
        volatile
            && conditions.volume_ratio >= self.config.volume_ratio_threshold
            && !conditions.is_rapid_decline
            && conditions.price_change_1m > self.config.market_decline_threshold
            && conditions.market_trend != MarketTrend::Bearish
    }

    /// Market-wide drop that suspends the strategy outright
    pub fn market_decline(&self, conditions: &MarketConditions) -> Option<SuspensionReason> {
        let threshold = self.config.market_decline_threshold;
        (conditions.price_change_1m <= threshold).then(|| SuspensionReason::MarketDecline {
            change: conditions.price_change_1m,
            threshold,
        })
    }

    /// Confidence of an initial buy, boosted when oversold
    pub fn buy_confidence(&self, conditions: &MarketConditions) -> Decimal {
        let mut confidence = dec!(0.5);

        if conditions.rsi <= self.config.rsi_oversold {
            confidence += dec!(0.2);
        }
        if conditions.volatility_24h >= self.config.volatility_threshold {
            confidence += dec!(0.1);
        }
        if conditions.volume_ratio >= self.config.volume_ratio_threshold {
            confidence += dec!(0.1);
        }
        if conditions.market_trend == MarketTrend::Bullish {
            confidence += dec!(0.1);
        }

        confidence.max(dec!(0)).min(dec!(1))
    }
}

impl Default for MarketAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
