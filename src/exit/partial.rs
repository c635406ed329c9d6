//! Partial-sell ladder

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// One rung of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Share of the target profit at which the rung fires (0.5 = half the target)
    pub target_fraction: Decimal,
    /// Share of the remaining quantity to sell
    pub sell_fraction: Decimal,
}

impl Milestone {
    pub fn new(target_fraction: Decimal, sell_fraction: Decimal) -> Self {
        Self {
            target_fraction,
            sell_fraction,
        }
    }

    /// Default ladder: 30% at half the target, then half of the rest at the target
    pub fn default_ladder() -> Vec<Milestone> {
        vec![
            Milestone::new(dec!(0.5), dec!(0.3)),
            Milestone::new(dec!(1.0), dec!(0.5)),
        ]
    }
}

/// A rung whose threshold has been met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneHit {
    /// Position of the rung in the ladder
    pub index: usize,
    pub sell_fraction: Decimal,
    /// Threshold in percent points
    pub threshold_percent: Decimal,
}

/// Decides how much to liquidate at successive profit milestones
///
/// Completion is tracked by the caller and passed in, so each rung fires at
/// most once per position and the manager itself holds no per-position state.
#[derive(Debug, Clone)]
pub struct PartialSellManager {
    target_profit: Decimal,
    ladder: Vec<Milestone>,
}

impl PartialSellManager {
    /// Create a manager for a target profit in percent points
    pub fn new(target_profit: Decimal, ladder: Vec<Milestone>) -> Self {
        Self {
            target_profit,
            ladder,
        }
    }

    pub fn target_profit(&self) -> Decimal {
        self.target_profit
    }

    pub fn ladder(&self) -> &[Milestone] {
        &self.ladder
    }

    /// Threshold of a rung in percent points
    pub fn threshold_percent(&self, milestone: &Milestone) -> Decimal {
        milestone.target_fraction * self.target_profit
    }

    /// First rung not yet completed, if any
    pub fn next_milestone(&self, completed: &[usize]) -> Option<(usize, &Milestone)> {
        self.ladder
            .iter()
            .enumerate()
            .find(|(i, _)| !completed.contains(i))
    }

    /// The next uncompleted rung when its threshold is met
    pub fn should_partial_sell(
        &self,
        current_pnl_percent: Decimal,
        completed: &[usize],
    ) -> Option<MilestoneHit> {
        let (index, milestone) = self.next_milestone(completed)?;
        let threshold_percent = self.threshold_percent(milestone);
        if current_pnl_percent < threshold_percent {
            return None;
        }
        Some(MilestoneHit {
            index,
            sell_fraction: milestone.sell_fraction,
            threshold_percent,
        })
    }

    /// Quantity to sell for a fraction of the held quantity
    pub fn calculate_sell_quantity(total_quantity: Decimal, sell_fraction: Decimal) -> Decimal {
        if total_quantity <= Decimal::ZERO || sell_fraction <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (total_quantity * sell_fraction).min(total_quantity)
    }

    /// Share of the original quantity left after the completed rungs
    pub fn remaining_quantity_ratio(&self, completed: &[usize]) -> Decimal {
        self.ladder
            .iter()
            .enumerate()
            .filter(|(i, _)| completed.contains(i))
            .fold(Decimal::ONE, |ratio, (_, m)| ratio * (Decimal::ONE - m.sell_fraction))
    }
}
