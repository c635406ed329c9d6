//! Strategy runner
//!
//! Drives one strategy instance over a tick stream: restore, evaluate,
//! execute, apply the fill, persist. Ticks for an instance are handled one
//! at a time, so a fill is always applied before the next evaluation.

use super::{Signal, SignalReason, Strategy, StrategyError, StrategyInfo, StrategyState, TickContext};
use crate::execution::{
    quote_currency, BalanceProvider, Fill, OrderExecutor, RetryPolicy, RetryingExecutor,
};
use crate::feed::MarketTick;
use crate::persistence::StateStore;
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

/// What happened on one tick
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// The strategy evaluated the tick rather than only recording it
    pub evaluated: bool,
    pub signal: Option<Signal>,
    /// Present only when the fill was applied to the strategy
    pub fill: Option<Fill>,
}

/// Owns one strategy and its collaborators
pub struct StrategyRunner {
    strategy: Box<dyn Strategy>,
    executor: RetryingExecutor,
    balances: Arc<dyn BalanceProvider>,
    store: Arc<dyn StateStore>,
    last_evaluation: Option<DateTime<Utc>>,
}

impl StrategyRunner {
    pub fn new(
        strategy: Box<dyn Strategy>,
        executor: RetryingExecutor,
        balances: Arc<dyn BalanceProvider>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            strategy,
            executor,
            balances,
            store,
            last_evaluation: None,
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> &mut dyn Strategy {
        self.strategy.as_mut()
    }

    /// Load the persisted snapshot, if any, into the strategy
    pub async fn restore(&mut self) -> anyhow::Result<bool> {
        let id = self.strategy.id().to_string();
        let Some(state) = self
            .store
            .load_state(&id)
            .await
            .with_context(|| format!("loading state for {id}"))?
        else {
            tracing::info!(strategy_id = %id, "No saved state, starting fresh");
            return Ok(false);
        };

        self.strategy
            .restore_state(state)
            .with_context(|| format!("restoring state for {id}"))?;
        Ok(true)
    }

    /// Write the current snapshot
    pub async fn persist(&self) -> anyhow::Result<()> {
        let id = self.strategy.id();
        self.store
            .save_state(id, &self.strategy.serialize_state())
            .await
            .with_context(|| format!("saving state for {id}"))
    }

    /// Restore, consume ticks until shutdown or end of stream, then persist
    pub async fn run(
        mut self,
        mut ticks: mpsc::Receiver<MarketTick>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<StrategyState> {
        self.restore().await?;
        tracing::info!(
            strategy_id = %self.strategy.id(),
            market = %self.strategy.market(),
            "Strategy runner started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(strategy_id = %self.strategy.id(), "Shutdown requested");
                        break;
                    }
                }

                result = ticks.recv() => {
                    match result {
                        Some(tick) => {
                            if let Err(e) = self.handle_tick(&tick).await {
                                tracing::error!(
                                    strategy_id = %self.strategy.id(),
                                    error = %e,
                                    "Tick handling failed"
                                );
                            }
                        }
                        None => {
                            tracing::info!(strategy_id = %self.strategy.id(), "Tick stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.persist().await?;
        let state = self.strategy.serialize_state();
        tracing::info!(
            strategy_id = %state.strategy_id,
            phase = %state.phase(),
            daily_pnl = %state.daily_pnl,
            "Strategy runner stopped"
        );
        Ok(state)
    }

    fn due(&self, at: DateTime<Utc>) -> bool {
        self.last_evaluation
            .map_or(true, |last| at - last >= self.strategy.evaluation_interval())
    }

    /// Process one tick end to end
    ///
    /// Malformed ticks are dropped. Order failures leave the strategy state
    /// as it was before the signal.
    pub async fn handle_tick(&mut self, tick: &MarketTick) -> anyhow::Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        if tick.market != self.strategy.market() {
            return Ok(outcome);
        }

        if !self.due(tick.timestamp) {
            self.observe(tick);
            return Ok(outcome);
        }

        let currency = quote_currency(self.strategy.market()).to_string();
        let available_balance = match self.balances.balance(&currency).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(
                    strategy_id = %self.strategy.id(),
                    error = %e,
                    "Balance unavailable, skipping evaluation"
                );
                self.observe(tick);
                return Ok(outcome);
            }
        };

        let started = Instant::now();
        let evaluated = self.strategy.evaluate(&TickContext {
            tick,
            available_balance,
        });
        telemetry::record_latency(LatencyMetric::Evaluation, self.strategy.id(), started.elapsed());

        let signal = match evaluated {
            Ok(signal) => signal,
            Err(StrategyError::Input(e)) => {
                self.reject(&e.to_string());
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };
        self.last_evaluation = Some(tick.timestamp);
        outcome.evaluated = true;

        if let Some(signal) = signal {
            telemetry::increment(CounterMetric::Signals, self.strategy.id(), signal.reason.as_str());
            tracing::info!(
                strategy_id = %signal.strategy_id,
                market = %signal.market,
                action = %signal.action,
                reason = %signal.reason,
                quantity = %signal.quantity,
                price = %signal.price,
                confidence = %signal.confidence,
                "Signal"
            );

            if let Some(fill) = self.execute(&signal).await {
                match self.strategy.apply_fill(&signal, &fill) {
                    Ok(()) => {
                        telemetry::increment(
                            CounterMetric::Fills,
                            self.strategy.id(),
                            signal.reason.as_str(),
                        );
                        if let Err(e) = self.persist().await {
                            tracing::error!(
                                strategy_id = %self.strategy.id(),
                                error = %e,
                                "Failed to persist state after fill"
                            );
                        }
                        outcome.fill = Some(fill);
                    }
                    Err(e) => {
                        tracing::error!(
                            strategy_id = %self.strategy.id(),
                            order = %fill.order_id,
                            error = %e,
                            "Fill could not be applied"
                        );
                    }
                }
            }
            outcome.signal = Some(signal);
        }

        self.record_gauges(&self.strategy.describe(), tick.price);
        Ok(outcome)
    }

    fn observe(&mut self, tick: &MarketTick) {
        if let Err(e) = self.strategy.observe(tick) {
            self.reject(&e.to_string());
        }
    }

    fn reject(&self, error: &str) {
        tracing::warn!(strategy_id = %self.strategy.id(), %error, "Dropping invalid tick");
        telemetry::increment(CounterMetric::RejectedTicks, self.strategy.id(), "invalid");
    }

    /// Place the signal's order; a failed stop-loss is re-sent at market
    async fn execute(&self, signal: &Signal) -> Option<Fill> {
        let request = signal.order_request();
        let started = Instant::now();
        let mut result = self.executor.place(&request).await;

        if let Err(e) = &result {
            if signal.reason == SignalReason::StopLoss {
                tracing::warn!(
                    strategy_id = %self.strategy.id(),
                    error = %e,
                    "Stop-loss order failed, forcing market order"
                );
                let forced = RetryPolicy::immediate(self.executor.policy().max_attempts);
                result = self
                    .executor
                    .place_with(&request.clone().into_market(), &forced)
                    .await;
            }
        }
        telemetry::record_latency(
            LatencyMetric::OrderPlacement,
            self.strategy.id(),
            started.elapsed(),
        );

        match result {
            Ok(fill) => Some(fill),
            Err(e) => {
                tracing::error!(
                    strategy_id = %self.strategy.id(),
                    reason = %signal.reason,
                    order = %request.client_order_id,
                    error = %e,
                    "Order failed, state left unchanged"
                );
                telemetry::increment(
                    CounterMetric::OrderFailures,
                    self.strategy.id(),
                    signal.reason.as_str(),
                );
                None
            }
        }
    }

    fn record_gauges(&self, info: &StrategyInfo, price: Decimal) {
        let id = info.id.as_str();
        let average = info.position.average_price;
        let unrealized = if average.is_zero() {
            Decimal::ZERO
        } else {
            (price - average) / average * Decimal::ONE_HUNDRED
        };

        telemetry::set_gauge(GaugeMetric::DailyPnl, id, info.daily_pnl);
        telemetry::set_gauge(GaugeMetric::OpenQuantity, id, info.position.total_quantity);
        telemetry::set_gauge(GaugeMetric::UnrealizedPnlPct, id, unrealized);
        telemetry::set_gauge(
            GaugeMetric::ConsecutiveLosses,
            id,
            Decimal::from(info.consecutive_losses),
        );
        telemetry::set_gauge(
            GaugeMetric::Suspended,
            id,
            if info.is_suspended {
                Decimal::ONE
            } else {
                Decimal::ZERO
            },
        );
    }
}
