//! Position manager

use super::{
    EntryKind, FeeSchedule, Pnl, Position, PositionEntry, PositionError, PositionStatus,
    RealizedSlice, SellOutcome,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Residual quantity below which a position counts as closed
pub const DUST_EPSILON: Decimal = dec!(0.00000001);

/// Realized pnl and fee total of selling `quantity` at `price`
///
/// Both fee legs are charged: the buy fee on the cost basis and the sell fee
/// on the proceeds.
fn sell_breakdown(
    fees: &FeeSchedule,
    average: Decimal,
    quantity: Decimal,
    price: Decimal,
) -> (Decimal, Decimal) {
    let fee_total = average * quantity * fees.buy_fee_rate + price * quantity * fees.sell_fee_rate;
    (quantity * (price - average) - fee_total, fee_total)
}

/// Owns the single open position of one strategy instance
#[derive(Debug, Clone)]
pub struct PositionManager {
    market: String,
    fees: FeeSchedule,
    position: Option<Position>,
}

impl PositionManager {
    /// Create an empty manager for a market
    pub fn new(market: impl Into<String>, fees: FeeSchedule) -> Self {
        Self {
            market: market.into(),
            fees,
            position: None,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Replace the position wholesale (state restore)
    pub fn restore(&mut self, position: Option<Position>) {
        self.position = position;
    }

    /// Record a buy fill
    pub fn add_entry(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        kind: EntryKind,
        timestamp: DateTime<Utc>,
    ) -> Result<&Position, PositionError> {
        if quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidQuantity(quantity));
        }
        if price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice(price));
        }

        let cost = price * quantity;
        let entry = PositionEntry {
            price,
            quantity,
            cost,
            kind,
            timestamp,
        };

        match kind {
            EntryKind::Initial => {
                if self.position.is_some() {
                    return Err(PositionError::AlreadyOpen);
                }
                self.position = Some(Position {
                    market: self.market.clone(),
                    entries: vec![entry],
                    average_price: price,
                    total_quantity: quantity,
                    total_cost: cost,
                    realized: vec![],
                    created_at: timestamp,
                    updated_at: timestamp,
                });
            }
            EntryKind::Averaging => {
                let position = self.position.as_mut().ok_or(PositionError::NoPosition)?;
                position.entries.push(entry);
                position.total_cost += cost;
                position.total_quantity += quantity;
                position.average_price = position.total_cost / position.total_quantity;
                position.updated_at = timestamp;
            }
        }

        self.position.as_ref().ok_or(PositionError::NoPosition)
    }

    /// Sell part (or all) of the position
    ///
    /// Cost basis is reduced at the average price, so the average of the
    /// remainder is unchanged. A remainder within the dust tolerance closes
    /// the position.
    pub fn partial_sell(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<SellOutcome, PositionError> {
        if quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidQuantity(quantity));
        }
        if price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice(price));
        }
        let epsilon = DUST_EPSILON;
        let fees = self.fees;
        let position = self.position.as_mut().ok_or(PositionError::NoPosition)?;

        if quantity > position.total_quantity + epsilon {
            return Err(PositionError::InsufficientPosition {
                requested: quantity,
                available: position.total_quantity,
            });
        }
        let quantity = quantity.min(position.total_quantity);

        let average = position.average_price;
        let (realized_pnl, fee_total) = sell_breakdown(&fees, average, quantity, price);

        position.total_quantity -= quantity;
        position.total_cost -= average * quantity;
        position.updated_at = timestamp;
        position.realized.push(RealizedSlice {
            price,
            quantity,
            pnl: realized_pnl,
            fees: fee_total,
            timestamp,
        });

        let closed = position.total_quantity <= epsilon;
        if closed {
            tracing::debug!(
                market = %position.market,
                residual = %position.total_quantity,
                "Position fully closed"
            );
            self.clear();
        }

        Ok(SellOutcome {
            realized_pnl,
            fees: fee_total,
            closed,
        })
    }

    /// Net pnl and fees a sell of `quantity` at `price` would realize
    pub fn estimate_sell(&self, quantity: Decimal, price: Decimal) -> Option<(Decimal, Decimal)> {
        let position = self.position.as_ref()?;
        let quantity = quantity.min(position.total_quantity);
        Some(sell_breakdown(
            &self.fees,
            position.average_price,
            quantity,
            price,
        ))
    }

    /// Unrealized pnl at `current_price`, net of entry and exit fees
    pub fn calculate_pnl(&self, current_price: Decimal) -> Pnl {
        let Some(position) = &self.position else {
            return Pnl::default();
        };

        let basis = position.total_cost * (Decimal::ONE + self.fees.buy_fee_rate);
        let proceeds =
            current_price * position.total_quantity * (Decimal::ONE - self.fees.sell_fee_rate);
        let absolute = proceeds - basis;
        let percent = if basis.is_zero() {
            dec!(0)
        } else {
            absolute / basis * dec!(100)
        };

        Pnl { absolute, percent }
    }

    /// Gross price move from the average, in percent
    pub fn price_change_percent(&self, current_price: Decimal) -> Decimal {
        match &self.position {
            Some(p) if !p.average_price.is_zero() => {
                (current_price - p.average_price) / p.average_price * dec!(100)
            }
            _ => dec!(0),
        }
    }

    /// Fee-adjusted breakeven sell price of the open position
    pub fn breakeven_price(&self) -> Option<Decimal> {
        self.position
            .as_ref()
            .map(|p| self.fees.breakeven_price(p.average_price))
    }

    /// Reset to the empty position
    pub fn clear(&mut self) {
        self.position = None;
    }

    /// Read-only snapshot
    pub fn status(&self) -> PositionStatus {
        match &self.position {
            Some(p) => PositionStatus {
                average_price: p.average_price,
                total_quantity: p.total_quantity,
                entry_count: p.entries.len(),
                averaging_count: p.averaging_count(),
            },
            None => PositionStatus::empty(),
        }
    }
}
