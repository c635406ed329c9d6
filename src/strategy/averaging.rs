//! Stop-loss averaging strategy
//!
//! One evaluation per tick runs a single transition function over the
//! current state and regime snapshot. Checks are ordered, and the first one
//! that applies decides the tick:
//!
//! 1. stop-loss (net pnl at or below the stop level), then the breakeven
//!    stop once a partial sell has filled
//! 2. market-decline suspension
//! 3. averaging buy, gated by the risk controller
//! 4. partial-sell ladder, trailing activation, trailing trigger
//! 5. breakeven fallback when the target is reached without any milestone
//!
//! With no position, entries need a full window, the regime entry gate and
//! the risk gates. A suspended instance emits nothing until the next trading
//! day or an operator resume.

use super::{
    Phase, Signal, SignalReason, Strategy, StrategyError, StrategyInfo, StrategyState,
    TickContext, TradeRecord,
};
use crate::analysis::{MarketAnalyzer, MarketConditions, PriceHistory, PriceSample};
use crate::config::{StrategyConfig, StrategyParams};
use crate::execution::{Fill, OrderSide, OrderType};
use crate::exit::{MilestoneHit, PartialSellManager, TrailingStopManager};
use crate::feed::{InputError, MarketTick};
use crate::position::{EntryKind, Position, PositionManager};
use crate::risk::{GateDecision, GateInput, RiskCheck, RiskController, SuspensionReason};
use crate::telemetry::{self, CounterMetric};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

/// Decimal places of order quantities
const QUANTITY_DP: u32 = 8;

/// Outcome of the transition function for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Hold,
    /// Initial buy of the clamped notional
    Enter {
        notional: Decimal,
        confidence: Decimal,
    },
    /// Averaging buy of the clamped notional
    Average { notional: Decimal },
    StopLoss,
    /// Remainder fell back to breakeven after a partial sell
    BreakevenStop,
    PartialSell(MilestoneHit),
    ArmTrailing,
    TrailingStop,
    /// Target reached without a milestone firing
    TakeProfit,
    Suspend(SuspensionReason),
}

/// Per-tick inputs to the transition function
struct Snapshot<'a> {
    price: Decimal,
    balance: Decimal,
    conditions: &'a MarketConditions,
    history_ready: bool,
}

/// Averaging-down scalper with a profit ladder and trailing stop
pub struct StopLossAveragingStrategy {
    id: String,
    market: String,
    prioritized: bool,
    params: StrategyParams,
    analyzer: MarketAnalyzer,
    risk: RiskController,
    positions: PositionManager,
    ladder: PartialSellManager,
    trailing: TrailingStopManager,
    history: PriceHistory,
    /// `position` and `trailing` live in their managers; this copy keeps them empty
    state: StrategyState,
}

impl StopLossAveragingStrategy {
    /// Build an instance from validated configuration
    pub fn new(config: &StrategyConfig) -> Result<Self, StrategyError> {
        config.validate()?;
        let params = config.params.clone();

        Ok(Self {
            id: config.id.clone(),
            market: config.market.clone(),
            prioritized: config.prioritized,
            analyzer: MarketAnalyzer::new(config.analyzer.clone()),
            risk: RiskController::new(config.risk.clone()),
            positions: PositionManager::new(config.market.clone(), params.fees()),
            ladder: PartialSellManager::new(
                params.target_profit,
                params.partial_sell_ladder.clone(),
            ),
            trailing: TrailingStopManager::new(params.trailing()),
            history: PriceHistory::new(config.analyzer.history_capacity),
            state: StrategyState::new(config.id.clone(), config.market.clone()),
            params,
        })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn position(&self) -> Option<&Position> {
        self.positions.position()
    }

    pub fn phase(&self) -> Phase {
        Phase::derive(
            self.positions.position(),
            &self.state.completed_milestones,
            self.trailing.is_activated(),
        )
    }

    pub fn is_suspended(&self) -> bool {
        self.state.is_suspended
    }

    fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        (ts + Duration::hours(i64::from(self.params.trading_day_offset_hours))).date_naive()
    }

    /// Start a new session when the trading date advances
    fn roll_session(&mut self, ts: DateTime<Utc>) {
        let date = self.trading_date(ts);
        let Some(current) = self.state.session_date else {
            self.state.session_date = Some(date);
            return;
        };
        if date <= current {
            return;
        }

        tracing::info!(
            strategy_id = %self.id,
            from = %current,
            to = %date,
            daily_pnl = %self.state.daily_pnl,
            trades = self.state.daily_trades.len(),
            "Trading day rolled over"
        );
        if let Some(reason) = self.state.suspension_reason.take() {
            tracing::info!(strategy_id = %self.id, %reason, "Suspension lifted at day boundary");
        }
        self.state.daily_pnl = Decimal::ZERO;
        self.state.daily_trades.clear();
        self.state.is_suspended = false;
        self.state.session_date = Some(date);
    }

    fn accepts(&self, tick: &MarketTick) -> Result<bool, StrategyError> {
        tick.validate()?;
        if tick.market != self.market {
            tracing::debug!(
                strategy_id = %self.id,
                market = %tick.market,
                "Ignoring tick for another market"
            );
            return Ok(false);
        }
        if let Some(newest) = self.history.latest() {
            if tick.timestamp < newest.timestamp {
                return Err(InputError::OutOfOrder {
                    timestamp: tick.timestamp,
                    newest: newest.timestamp,
                }
                .into());
            }
        }
        Ok(true)
    }

    fn push_sample(&mut self, tick: &MarketTick) {
        self.history.push(PriceSample {
            timestamp: tick.timestamp,
            price: tick.price,
            volume: tick.volume,
        });
    }

    fn gate(&self, snapshot: &Snapshot<'_>, desired_notional: Decimal) -> GateDecision {
        self.risk.evaluate(&GateInput {
            is_suspended: self.state.is_suspended,
            daily_pnl: self.state.daily_pnl,
            consecutive_losses: self.state.consecutive_losses,
            balance: snapshot.balance,
            volatility: snapshot.conditions.volatility_24h,
            desired_notional,
        })
    }

    /// The transition function; reads state, never mutates it
    fn transition(&self, snapshot: &Snapshot<'_>) -> Decision {
        if self.state.is_suspended {
            return Decision::Hold;
        }
        let Some(position) = self.positions.position() else {
            return self.entry_decision(snapshot);
        };

        let p = &self.params;
        let pnl = self.positions.calculate_pnl(snapshot.price);
        let gross = self.positions.price_change_percent(snapshot.price);

        if pnl.percent <= p.stop_loss_level {
            return Decision::StopLoss;
        }
        if self.state.stop_raised_to_breakeven && pnl.absolute <= Decimal::ZERO {
            return Decision::BreakevenStop;
        }
        if let Some(reason) = self.analyzer.market_decline(snapshot.conditions) {
            return Decision::Suspend(reason);
        }

        if pnl.percent <= p.averaging_trigger {
            if position.averaging_count() >= p.max_averaging_count as usize {
                return Decision::Hold;
            }
            let desired = position.initial_entry().map_or(Decimal::ZERO, |e| e.cost);
            return match self.gate(snapshot, desired) {
                GateDecision::Approved { notional } => Decision::Average { notional },
                GateDecision::Deny(reason) => Decision::Suspend(reason),
                GateDecision::Suspended | GateDecision::BelowMinimum { .. } => Decision::Hold,
            };
        }

        if let Some(hit) = self
            .ladder
            .should_partial_sell(gross, &self.state.completed_milestones)
        {
            return Decision::PartialSell(hit);
        }

        if !self.trailing.is_activated() {
            if self.trailing.should_activate(gross) {
                return Decision::ArmTrailing;
            }
        } else if self.trailing.should_trigger_stop(snapshot.price) {
            return Decision::TrailingStop;
        }

        let fallback = !self.trailing.is_activated()
            && self.state.completed_milestones.is_empty()
            && gross >= p.target_profit
            && pnl.absolute > Decimal::ZERO;
        if fallback {
            return Decision::TakeProfit;
        }

        Decision::Hold
    }

    fn entry_decision(&self, snapshot: &Snapshot<'_>) -> Decision {
        if !snapshot.history_ready {
            return Decision::Hold;
        }
        if let Some(reason) = self.analyzer.market_decline(snapshot.conditions) {
            return Decision::Suspend(reason);
        }
        if !self.analyzer.allows_entry(snapshot.conditions, self.prioritized) {
            return Decision::Hold;
        }

        match self.gate(snapshot, self.params.initial_order_amount) {
            GateDecision::Approved { notional } => Decision::Enter {
                notional,
                confidence: self.analyzer.buy_confidence(snapshot.conditions),
            },
            GateDecision::Deny(reason) => Decision::Suspend(reason),
            GateDecision::Suspended | GateDecision::BelowMinimum { .. } => Decision::Hold,
        }
    }

    fn apply_decision(
        &mut self,
        decision: Decision,
        tick: &MarketTick,
        conditions: &MarketConditions,
    ) -> Option<Signal> {
        let held = self.positions.status().total_quantity;

        match decision {
            Decision::Hold => None,
            Decision::Suspend(reason) => {
                self.suspend(&reason);
                None
            }
            Decision::ArmTrailing => {
                self.trailing.activate(tick.price);
                tracing::info!(
                    strategy_id = %self.id,
                    price = %tick.price,
                    stop = ?self.trailing.stop_price(),
                    "Trailing stop armed"
                );
                None
            }
            Decision::Enter {
                notional,
                confidence,
            } => self.buy_signal(SignalReason::InitialBuy, notional, confidence, tick, conditions),
            Decision::Average { notional } => {
                let confidence = SignalReason::Averaging
                    .fixed_confidence()
                    .unwrap_or(Decimal::ONE);
                self.buy_signal(SignalReason::Averaging, notional, confidence, tick, conditions)
            }
            Decision::StopLoss => {
                Some(self.sell_signal(SignalReason::StopLoss, held, None, tick, conditions))
            }
            Decision::BreakevenStop | Decision::TakeProfit => {
                Some(self.sell_signal(SignalReason::BreakevenExit, held, None, tick, conditions))
            }
            Decision::TrailingStop => {
                Some(self.sell_signal(SignalReason::TrailingStop, held, None, tick, conditions))
            }
            Decision::PartialSell(hit) => {
                let quantity = PartialSellManager::calculate_sell_quantity(held, hit.sell_fraction);
                Some(self.sell_signal(
                    SignalReason::PartialSell,
                    quantity,
                    Some(hit.index),
                    tick,
                    conditions,
                ))
            }
        }
    }

    fn order_type(&self, reason: SignalReason) -> OrderType {
        if self.params.limit_orders && !reason.is_protective() {
            OrderType::Limit
        } else {
            OrderType::Market
        }
    }

    fn buy_signal(
        &self,
        reason: SignalReason,
        notional: Decimal,
        confidence: Decimal,
        tick: &MarketTick,
        conditions: &MarketConditions,
    ) -> Option<Signal> {
        let quantity =
            (notional / tick.price).round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);
        if quantity <= Decimal::ZERO {
            return None;
        }
        Some(self.build_signal(reason, quantity, confidence, None, None, tick, conditions))
    }

    fn sell_signal(
        &self,
        reason: SignalReason,
        quantity: Decimal,
        milestone: Option<usize>,
        tick: &MarketTick,
        conditions: &MarketConditions,
    ) -> Signal {
        let expected_pnl = self
            .positions
            .estimate_sell(quantity, tick.price)
            .map(|(pnl, _)| pnl);
        let confidence = reason.fixed_confidence().unwrap_or(Decimal::ONE);
        self.build_signal(
            reason,
            quantity,
            confidence,
            expected_pnl,
            milestone,
            tick,
            conditions,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build_signal(
        &self,
        reason: SignalReason,
        quantity: Decimal,
        confidence: Decimal,
        expected_pnl: Option<Decimal>,
        milestone: Option<usize>,
        tick: &MarketTick,
        conditions: &MarketConditions,
    ) -> Signal {
        Signal {
            id: self.signal_id(reason, milestone, tick.timestamp),
            strategy_id: self.id.clone(),
            market: self.market.clone(),
            action: reason.side(),
            reason,
            quantity,
            price: tick.price,
            order_type: self.order_type(reason),
            confidence,
            position_snapshot: self.positions.status(),
            market_conditions: conditions.clone(),
            expected_pnl,
            milestone,
            timestamp: tick.timestamp,
        }
    }

    /// Same instance, tick time, reason and rung always map to the same id
    fn signal_id(
        &self,
        reason: SignalReason,
        milestone: Option<usize>,
        timestamp: DateTime<Utc>,
    ) -> Uuid {
        let name = format!(
            "{}/{}/{}/{}/{}",
            self.id,
            self.market,
            timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            reason,
            milestone.map_or_else(|| "-".to_string(), |m| m.to_string())
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    fn suspend(&mut self, reason: &SuspensionReason) {
        if self.state.is_suspended {
            return;
        }
        tracing::warn!(
            strategy_id = %self.id,
            market = %self.market,
            %reason,
            "Strategy suspended"
        );
        telemetry::increment(CounterMetric::Suspensions, &self.id, reason.kind());
        self.state.is_suspended = true;
        self.state.suspension_reason = Some(reason.to_string());
    }

    /// Suspend right after a fill that tripped a session limit
    fn check_post_trade_limits(&mut self) {
        let limits = self.risk.limits();
        let checks = [
            RiskController::check_daily_loss_limit(self.state.daily_pnl, limits.daily_loss_limit),
            RiskController::check_consecutive_losses(
                self.state.consecutive_losses,
                limits.consecutive_loss_limit,
            ),
        ];
        if let Some(RiskCheck::Deny(reason)) = checks.into_iter().find(|c| !c.is_allowed()) {
            self.suspend(&reason);
        }
    }

    fn reset_exit_progress(&mut self) {
        self.state.completed_milestones.clear();
        self.state.stop_raised_to_breakeven = false;
        self.trailing.reset();
    }
}

impl Strategy for StopLossAveragingStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn market(&self) -> &str {
        &self.market
    }

    fn observe(&mut self, tick: &MarketTick) -> Result<(), StrategyError> {
        if self.accepts(tick)? {
            self.push_sample(tick);
        }
        Ok(())
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Result<Option<Signal>, StrategyError> {
        let tick = ctx.tick;
        if !self.accepts(tick)? {
            return Ok(None);
        }

        self.roll_session(tick.timestamp);
        self.push_sample(tick);
        if self.trailing.is_activated() {
            self.trailing.update_high_price(tick.price);
        }

        let conditions = self.analyzer.analyze(&self.history, tick.daily.as_ref());
        tracing::debug!(
            strategy_id = %self.id,
            price = %tick.price,
            volatility = %conditions.volatility_24h,
            volume_ratio = %conditions.volume_ratio,
            rsi = %conditions.rsi,
            trend = ?conditions.market_trend,
            rapid_decline = conditions.is_rapid_decline,
            "Market analyzed"
        );

        let snapshot = Snapshot {
            price: tick.price,
            balance: ctx.available_balance,
            conditions: &conditions,
            history_ready: self.history.len() >= self.analyzer.required_history_length(),
        };
        let decision = self.transition(&snapshot);
        if decision != Decision::Hold {
            tracing::debug!(strategy_id = %self.id, ?decision, "Transition");
        }

        Ok(self.apply_decision(decision, tick, &conditions))
    }

    fn apply_fill(&mut self, signal: &Signal, fill: &Fill) -> Result<(), StrategyError> {
        if fill.market != self.market {
            return Err(StrategyError::MarketMismatch {
                expected: self.market.clone(),
                got: fill.market.clone(),
            });
        }
        if fill.side != signal.reason.side() || fill.side != signal.action {
            return Err(StrategyError::FillMismatch(format!(
                "{} fill for {} signal",
                fill.side, signal.reason
            )));
        }

        let realized_pnl = match fill.side {
            OrderSide::Buy => {
                let kind = match signal.reason {
                    SignalReason::InitialBuy => EntryKind::Initial,
                    _ => EntryKind::Averaging,
                };
                self.positions
                    .add_entry(fill.price, fill.quantity, kind, fill.timestamp)?;
                self.roll_session(fill.timestamp);
                if kind == EntryKind::Initial {
                    self.reset_exit_progress();
                }
                Decimal::ZERO
            }
            OrderSide::Sell => {
                let outcome = self
                    .positions
                    .partial_sell(fill.quantity, fill.price, fill.timestamp)?;
                self.roll_session(fill.timestamp);
                self.state.daily_pnl += outcome.realized_pnl;

                match signal.reason {
                    SignalReason::PartialSell => {
                        if let Some(index) = signal.milestone {
                            if !self.state.completed_milestones.contains(&index) {
                                self.state.completed_milestones.push(index);
                            }
                        }
                        if !self.state.stop_raised_to_breakeven {
                            tracing::info!(
                                strategy_id = %self.id,
                                breakeven = ?self.positions.breakeven_price(),
                                "Stop raised to breakeven"
                            );
                        }
                        self.state.stop_raised_to_breakeven = true;
                    }
                    SignalReason::StopLoss => self.state.consecutive_losses += 1,
                    _ => self.state.consecutive_losses = 0,
                }

                if outcome.closed {
                    self.reset_exit_progress();
                }
                outcome.realized_pnl
            }
        };

        self.state.daily_trades.push(TradeRecord {
            market: fill.market.clone(),
            side: fill.side,
            reason: signal.reason,
            price: fill.price,
            quantity: fill.quantity,
            fee: fill.fee,
            realized_pnl,
            timestamp: fill.timestamp,
        });
        self.state.last_trade_time = Some(fill.timestamp);

        tracing::info!(
            strategy_id = %self.id,
            market = %self.market,
            reason = %signal.reason,
            price = %fill.price,
            quantity = %fill.quantity,
            realized_pnl = %realized_pnl,
            daily_pnl = %self.state.daily_pnl,
            consecutive_losses = self.state.consecutive_losses,
            phase = %self.phase(),
            "Fill applied"
        );

        self.check_post_trade_limits();
        Ok(())
    }

    fn required_history_length(&self) -> usize {
        self.analyzer.required_history_length()
    }

    fn evaluation_interval(&self) -> chrono::Duration {
        self.params.evaluation_interval()
    }

    fn serialize_state(&self) -> StrategyState {
        StrategyState {
            position: self.positions.position().cloned(),
            trailing: self.trailing.state().clone(),
            ..self.state.clone()
        }
    }

    fn restore_state(&mut self, mut state: StrategyState) -> Result<(), StrategyError> {
        if state.strategy_id != self.id || state.market != self.market {
            return Err(StrategyError::InvalidState(format!(
                "state for {}/{} restored into {}/{}",
                state.strategy_id, state.market, self.id, self.market
            )));
        }

        let position = state.position.take();
        if let Some(p) = &position {
            if p.market != self.market || p.entries.is_empty() || p.total_quantity <= Decimal::ZERO
            {
                return Err(StrategyError::InvalidState(format!(
                    "restored position on {} holds {} over {} entries",
                    p.market,
                    p.total_quantity,
                    p.entries.len()
                )));
            }
        }

        let trailing = std::mem::take(&mut state.trailing);
        if position.is_none() {
            state.completed_milestones.clear();
            state.stop_raised_to_breakeven = false;
            self.trailing.reset();
        } else {
            self.trailing.restore(trailing);
        }
        self.positions.restore(position);
        self.state = state;

        tracing::info!(
            strategy_id = %self.id,
            phase = %self.phase(),
            suspended = self.state.is_suspended,
            consecutive_losses = self.state.consecutive_losses,
            "State restored"
        );
        Ok(())
    }

    fn resume(&mut self) {
        tracing::info!(
            strategy_id = %self.id,
            reason = ?self.state.suspension_reason,
            consecutive_losses = self.state.consecutive_losses,
            "Strategy resumed by operator"
        );
        self.state.is_suspended = false;
        self.state.suspension_reason = None;
        self.state.consecutive_losses = 0;
    }

    fn describe(&self) -> StrategyInfo {
        let completed = &self.state.completed_milestones;
        let trailing = self.trailing.state();

        StrategyInfo {
            id: self.id.clone(),
            market: self.market.clone(),
            kind: "stop_loss_averaging",
            phase: self.phase(),
            prioritized: self.prioritized,
            params: self.params.clone(),
            position: self.positions.status(),
            breakeven_price: self.positions.breakeven_price(),
            consecutive_losses: self.state.consecutive_losses,
            daily_pnl: self.state.daily_pnl,
            is_suspended: self.state.is_suspended,
            suspension_reason: self.state.suspension_reason.clone(),
            completed_milestones: completed.clone(),
            next_milestone: self.ladder.next_milestone(completed).map(|(_, m)| *m),
            remaining_quantity_ratio: self.ladder.remaining_quantity_ratio(completed),
            stop_raised_to_breakeven: self.state.stop_raised_to_breakeven,
            trailing_activation_price: trailing.activation_price,
            trailing_high_water_price: trailing.high_water_price,
            trailing_stop_price: self.trailing.stop_price(),
            required_history_length: self.analyzer.required_history_length(),
        }
    }
}
