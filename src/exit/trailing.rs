//! Trailing stop

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Trailing stop parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingConfig {
    /// Target profit in percent points
    pub target_profit: Decimal,
    /// Multiple of the target at which the stop arms (1.5 = 150%)
    pub trigger_multiple: Decimal,
    /// Retracement from the high-water price that fires the stop, in percent
    pub trail_percentage: Decimal,
}

/// Persistable trailing stop state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingState {
    pub activated: bool,
    pub high_water_price: Option<Decimal>,
    pub activation_price: Option<Decimal>,
}

/// Tracks the high-water price once armed
#[derive(Debug, Clone)]
pub struct TrailingStopManager {
    config: TrailingConfig,
    state: TrailingState,
}

impl TrailingStopManager {
    pub fn new(config: TrailingConfig) -> Self {
        Self {
            config,
            state: TrailingState::default(),
        }
    }

    pub fn state(&self) -> &TrailingState {
        &self.state
    }

    pub fn restore(&mut self, state: TrailingState) {
        self.state = state;
    }

    pub fn is_activated(&self) -> bool {
        self.state.activated
    }

    /// Arming threshold in percent points
    pub fn activation_threshold(&self) -> Decimal {
        self.config.target_profit * self.config.trigger_multiple
    }

    /// Whether pnl has reached the arming threshold
    pub fn should_activate(&self, pnl_percent: Decimal) -> bool {
        pnl_percent >= self.activation_threshold()
    }

    /// Arm the stop at the current price
    pub fn activate(&mut self, price: Decimal) {
        self.state = TrailingState {
            activated: true,
            high_water_price: Some(price),
            activation_price: Some(price),
        };
    }

    /// Raise the high-water mark; no-op until armed
    pub fn update_high_price(&mut self, price: Decimal) {
        if !self.state.activated {
            return;
        }
        let high = self.state.high_water_price.map_or(price, |h| h.max(price));
        self.state.high_water_price = Some(high);
    }

    /// Current stop level
    pub fn stop_price(&self) -> Option<Decimal> {
        if !self.state.activated {
            return None;
        }
        let retrace = Decimal::ONE - self.config.trail_percentage / dec!(100);
        self.state.high_water_price.map(|h| h * retrace)
    }

    /// Whether the price has retraced to the stop
    pub fn should_trigger_stop(&self, current_price: Decimal) -> bool {
        self.stop_price().is_some_and(|stop| current_price <= stop)
    }

    pub fn reset(&mut self) {
        self.state = TrailingState::default();
    }
}
