//! Runner behavior around intervals, failures, persistence and shutdown

use crate::common::{entry_ticks, paper, runner, strategy_config, tick, ScriptedExecutor};
use async_trait::async_trait;
use avg_scalper::execution::{
    BalanceProvider, ExecutionError, OrderType, RetryPolicy, RetryingExecutor,
};
use avg_scalper::persistence::{JsonStateStore, StateStore};
use avg_scalper::strategy::{SignalReason, Strategy, StrategyFactory, StrategyRunner};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Feed the warm-up and entry ticks; the last one opens 100 @ 1000
async fn open_position(runner: &mut StrategyRunner) {
    let mut last = None;
    for t in entry_ticks() {
        last = Some(runner.handle_tick(&t).await.unwrap());
    }
    let outcome = last.unwrap();
    assert_eq!(
        outcome.signal.map(|s| s.reason),
        Some(SignalReason::InitialBuy)
    );
    assert!(outcome.fill.is_some());
}

fn store() -> (tempfile::TempDir, Arc<JsonStateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path()));
    (dir, store)
}

#[tokio::test]
async fn test_evaluation_interval_gates_ticks() {
    let (_dir, store) = store();
    let engine = paper();
    let mut runner = runner(&strategy_config("btc"), engine.clone(), engine, store);

    let first = runner.handle_tick(&tick(dec!(1000), dec!(1), 0)).await.unwrap();
    let early = runner.handle_tick(&tick(dec!(1000), dec!(1), 5)).await.unwrap();
    let due = runner.handle_tick(&tick(dec!(1000), dec!(1), 10)).await.unwrap();

    assert!(first.evaluated);
    assert!(!early.evaluated);
    assert!(due.evaluated);
}

#[tokio::test]
async fn test_other_market_and_malformed_ticks_skipped() {
    let (_dir, store) = store();
    let engine = paper();
    let mut runner = runner(&strategy_config("btc"), engine.clone(), engine, store);

    let mut foreign = tick(dec!(1000), dec!(1), 0);
    foreign.market = "KRW-ETH".to_string();
    assert!(!runner.handle_tick(&foreign).await.unwrap().evaluated);

    let outcome = runner.handle_tick(&tick(dec!(-1), dec!(1), 10)).await.unwrap();
    assert!(!outcome.evaluated);
    assert!(outcome.signal.is_none());

    // the rejected tick did not consume the evaluation slot
    assert!(runner.handle_tick(&tick(dec!(1000), dec!(1), 10)).await.unwrap().evaluated);
}

#[tokio::test]
async fn test_out_of_order_tick_dropped() {
    let (_dir, store) = store();
    let engine = paper();
    let mut runner = runner(&strategy_config("btc"), engine.clone(), engine.clone(), store);
    open_position(&mut runner).await;

    let stale = runner.handle_tick(&tick(dec!(960), dec!(1), 50)).await.unwrap();
    assert!(!stale.evaluated);
    assert!(stale.signal.is_none());
    let state = runner.strategy().serialize_state();
    assert_eq!(state.position.unwrap().total_quantity, dec!(100));
    assert_eq!(engine.fills().await.len(), 1);
}

#[tokio::test]
async fn test_rejected_entry_leaves_state_untouched() {
    let (_dir, store) = store();
    let engine = paper();
    let executor = Arc::new(ScriptedExecutor::new(engine.clone()).rejecting_buys());
    let mut runner = runner(&strategy_config("btc"), executor.clone(), engine.clone(), store);

    let mut last = None;
    for t in entry_ticks() {
        last = Some(runner.handle_tick(&t).await.unwrap());
    }
    let outcome = last.unwrap();
    assert_eq!(
        outcome.signal.map(|s| s.reason),
        Some(SignalReason::InitialBuy)
    );
    assert!(outcome.fill.is_none());

    let state = runner.strategy().serialize_state();
    assert!(state.position.is_none());
    assert!(state.daily_trades.is_empty());
    assert!(!state.is_suspended);
    assert!(engine.fills().await.is_empty());
    // rejections are not retried
    assert_eq!(executor.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_stop_loss_escalates_to_market() {
    let (_dir, store) = store();
    let engine = paper();
    let executor = Arc::new(ScriptedExecutor::new(engine.clone()).failing_sells(2));
    let mut runner = runner(&strategy_config("btc"), executor.clone(), engine, store);
    open_position(&mut runner).await;

    let outcome = runner.handle_tick(&tick(dec!(960), dec!(1), 210)).await.unwrap();
    assert_eq!(
        outcome.signal.as_ref().map(|s| s.reason),
        Some(SignalReason::StopLoss)
    );
    assert!(outcome.fill.is_some());

    // two attempts by the retry policy, then the forced market order
    let sells = executor.sell_requests();
    assert_eq!(sells.len(), 3);
    assert_eq!(sells[2].order_type, OrderType::Market);
    assert_eq!(sells[2].client_order_id, sells[0].client_order_id);

    let state = runner.strategy().serialize_state();
    assert!(state.position.is_none());
    assert_eq!(state.consecutive_losses, 1);
}

#[tokio::test]
async fn test_stop_loss_failure_keeps_position_for_next_tick() {
    let (_dir, store) = store();
    let engine = paper();
    let executor = Arc::new(ScriptedExecutor::new(engine.clone()).failing_sells(4));
    let mut runner = runner(&strategy_config("btc"), executor.clone(), engine, store);
    open_position(&mut runner).await;

    let failed = runner.handle_tick(&tick(dec!(960), dec!(1), 210)).await.unwrap();
    assert!(failed.signal.is_some());
    assert!(failed.fill.is_none());
    let state = runner.strategy().serialize_state();
    assert_eq!(state.position.unwrap().total_quantity, dec!(100));
    assert_eq!(state.consecutive_losses, 0);

    let retried = runner.handle_tick(&tick(dec!(960), dec!(1), 220)).await.unwrap();
    assert!(retried.fill.is_some());
    assert!(runner.strategy().serialize_state().position.is_none());
}

#[tokio::test]
async fn test_failed_partial_sell_is_not_escalated() {
    let (_dir, store) = store();
    let engine = paper();
    let executor = Arc::new(ScriptedExecutor::new(engine.clone()).failing_sells(2));
    let mut runner = runner(&strategy_config("btc"), executor.clone(), engine, store);
    open_position(&mut runner).await;

    let failed = runner.handle_tick(&tick(dec!(1005), dec!(1), 210)).await.unwrap();
    assert_eq!(
        failed.signal.as_ref().map(|s| s.reason),
        Some(SignalReason::PartialSell)
    );
    assert!(failed.fill.is_none());
    assert_eq!(executor.sell_requests().len(), 2);

    let state = runner.strategy().serialize_state();
    assert!(state.completed_milestones.is_empty());
    assert!(!state.stop_raised_to_breakeven);

    // the same rung fires again once orders go through
    let retried = runner.handle_tick(&tick(dec!(1005), dec!(1), 220)).await.unwrap();
    assert_eq!(retried.signal.unwrap().milestone, Some(0));
    assert!(retried.fill.is_some());
}

#[tokio::test]
async fn test_restart_restores_open_position() {
    let (_dir, store) = store();
    let engine = paper();

    let mut first = runner(&strategy_config("btc"), engine.clone(), engine.clone(), store.clone());
    open_position(&mut first).await;
    let saved = store.load_state("btc").await.unwrap().unwrap();
    assert_eq!(saved.position.as_ref().unwrap().total_quantity, dec!(100));

    let mut second = runner(&strategy_config("btc"), engine.clone(), engine, store);
    assert!(second.restore().await.unwrap());
    let outcome = second.handle_tick(&tick(dec!(960), dec!(1), 210)).await.unwrap();
    assert_eq!(
        outcome.signal.map(|s| s.reason),
        Some(SignalReason::StopLoss)
    );
    assert!(outcome.fill.is_some());
}

#[tokio::test]
async fn test_shutdown_persists_state() {
    let (_dir, store) = store();
    let engine = paper();
    let runner = runner(&strategy_config("btc"), engine.clone(), engine, store.clone());

    let (tick_tx, tick_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(runner.run(tick_rx, shutdown_rx));

    for t in entry_ticks() {
        tick_tx.send(t).await.unwrap();
    }
    // every tick received; the one in flight completes before shutdown is seen
    while tick_tx.capacity() < tick_tx.max_capacity() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown_tx.send(true).unwrap();

    let state = handle.await.unwrap().unwrap();
    assert!(state.position.is_some());
    let saved = store.load_state("btc").await.unwrap().unwrap();
    assert_eq!(saved, state);
    drop(tick_tx);
}

struct Unavailable;

#[async_trait]
impl BalanceProvider for Unavailable {
    async fn balance(&self, _currency: &str) -> Result<Decimal, ExecutionError> {
        Err(ExecutionError::Transport("balance endpoint down".into()))
    }
}

#[tokio::test]
async fn test_balance_failure_only_observes() {
    let (_dir, store) = store();
    let engine = paper();
    let mut runner = StrategyRunner::new(
        StrategyFactory::build(&strategy_config("btc")).unwrap(),
        RetryingExecutor::new(engine, RetryPolicy::immediate(1), Duration::from_secs(1)),
        Arc::new(Unavailable),
        store,
    );

    for t in entry_ticks() {
        let outcome = runner.handle_tick(&t).await.unwrap();
        assert!(!outcome.evaluated);
        assert!(outcome.signal.is_none());
    }
    assert!(runner.strategy().serialize_state().position.is_none());
}

#[tokio::test]
async fn test_instances_share_nothing() {
    let (_dir, store) = store();
    let engine = paper();
    let mut btc = runner(&strategy_config("btc"), engine.clone(), engine.clone(), store.clone());
    let mut other = runner(&strategy_config("btc-2"), engine.clone(), engine, store.clone());

    open_position(&mut btc).await;
    assert!(btc.strategy().serialize_state().position.is_some());
    assert!(other.strategy().serialize_state().position.is_none());

    let outcome = other.handle_tick(&tick(dec!(960), dec!(1), 210)).await.unwrap();
    assert!(outcome.signal.is_none());
    assert!(store.load_state("btc-2").await.unwrap().is_none());
}
