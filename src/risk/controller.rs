//! Risk controller

use super::{GateDecision, GateInput, RiskCheck, RiskLimits, SuspensionReason};
use rust_decimal::Decimal;

/// Stateless risk gates; all state lives on the strategy instance
#[derive(Debug, Clone)]
pub struct RiskController {
    limits: RiskLimits,
}

impl RiskController {
    /// Create a new risk controller
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Deny when the day's realized pnl is at or below `-limit`
    pub fn check_daily_loss_limit(daily_pnl: Decimal, limit: Decimal) -> RiskCheck {
        if daily_pnl <= -limit {
            return RiskCheck::Deny(SuspensionReason::DailyLossLimit { daily_pnl, limit });
        }
        RiskCheck::Allow
    }

    /// Deny when the loss streak has reached `max`
    pub fn check_consecutive_losses(count: u32, max: u32) -> RiskCheck {
        if count >= max {
            return RiskCheck::Deny(SuspensionReason::ConsecutiveLosses { count, limit: max });
        }
        RiskCheck::Allow
    }

    /// Deny when the balance is below the minimum
    pub fn check_account_balance(balance: Decimal, min_required: Decimal) -> RiskCheck {
        if balance < min_required {
            return RiskCheck::Deny(SuspensionReason::InsufficientBalance {
                balance,
                required: min_required,
            });
        }
        RiskCheck::Allow
    }

    /// Deny when volatility exceeds the cap
    pub fn check_volatility_threshold(volatility: Decimal, cap: Decimal) -> RiskCheck {
        if volatility > cap {
            return RiskCheck::Deny(SuspensionReason::ExcessiveVolatility { volatility, cap });
        }
        RiskCheck::Allow
    }

    /// Clamp an order notional to a share of the available balance
    pub fn validate_order_size(
        desired: Decimal,
        available_balance: Decimal,
        max_fraction: Decimal,
    ) -> Decimal {
        let cap = (available_balance * max_fraction).max(Decimal::ZERO);
        desired.min(cap).max(Decimal::ZERO)
    }

    /// Run the gates in order, first failure wins
    pub fn evaluate(&self, input: &GateInput) -> GateDecision {
        if input.is_suspended {
            return GateDecision::Suspended;
        }

        let checks = [
            Self::check_daily_loss_limit(input.daily_pnl, self.limits.daily_loss_limit),
            Self::check_consecutive_losses(
                input.consecutive_losses,
                self.limits.consecutive_loss_limit,
            ),
            Self::check_account_balance(input.balance, self.limits.min_balance),
            Self::check_volatility_threshold(input.volatility, self.limits.volatility_cap),
        ];

        if let Some(RiskCheck::Deny(reason)) = checks.into_iter().find(|c| !c.is_allowed()) {
            tracing::warn!(%reason, "Risk gate denied entry");
            return GateDecision::Deny(reason);
        }

        let notional = Self::validate_order_size(
            input.desired_notional,
            input.balance,
            self.limits.max_position_fraction,
        );
        if notional < self.limits.min_order_amount {
            tracing::debug!(
                %notional,
                min = %self.limits.min_order_amount,
                "Clamped order below exchange minimum"
            );
            return GateDecision::BelowMinimum { notional };
        }

        GateDecision::Approved { notional }
    }
}

impl Default for RiskController {
    fn default() -> Self {
        Self::new(RiskLimits::default())
    }
}
