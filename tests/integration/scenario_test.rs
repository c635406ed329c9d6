//! Full trading cycles driven through the runner over a tick channel

use crate::common::{entry_ticks, paper, runner, strategy_config, tick};
use avg_scalper::execution::{OrderSide, PaperEngine};
use avg_scalper::persistence::{JsonStateStore, StateStore};
use avg_scalper::feed::MarketTick;
use avg_scalper::strategy::{Phase, SignalReason, StrategyState};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

async fn run_ticks(
    engine: Arc<PaperEngine>,
    store: Arc<JsonStateStore>,
    ticks: Vec<MarketTick>,
) -> StrategyState {
    let runner = runner(&strategy_config("btc"), engine.clone(), engine, store);
    let (tick_tx, tick_rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(runner.run(tick_rx, shutdown_rx));
    for t in ticks {
        tick_tx.send(t).await.unwrap();
    }
    drop(tick_tx);
    handle.await.unwrap().unwrap()
}

#[tokio::test]
async fn test_ladder_then_trailing_stop_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path()));
    let engine = paper();

    let mut ticks = entry_ticks();
    ticks.extend([
        tick(dec!(1005), dec!(1), 210),
        tick(dec!(1010), dec!(1), 220),
        tick(dec!(1015), dec!(1), 230),
        tick(dec!(1020), dec!(1), 240),
        tick(dec!(1012), dec!(1), 250),
        tick(dec!(1009.8), dec!(1), 260),
    ]);
    let state = run_ticks(engine.clone(), store.clone(), ticks).await;

    let fills = engine.fills().await;
    let quantities: Vec<_> = fills.iter().map(|f| (f.side, f.quantity)).collect();
    assert_eq!(
        quantities,
        vec![
            (OrderSide::Buy, dec!(100)),
            (OrderSide::Sell, dec!(30)),
            (OrderSide::Sell, dec!(35)),
            (OrderSide::Sell, dec!(35)),
        ]
    );

    assert!(state.position.is_none());
    assert_eq!(state.phase(), Phase::Idle);
    assert_eq!(state.consecutive_losses, 0);
    assert!(state.daily_pnl > dec!(0));
    let reasons: Vec<_> = state.daily_trades.iter().map(|t| t.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SignalReason::InitialBuy,
            SignalReason::PartialSell,
            SignalReason::PartialSell,
            SignalReason::TrailingStop,
        ]
    );

    let saved = store.load_state("btc").await.unwrap().unwrap();
    assert_eq!(saved, state);
}

#[tokio::test]
async fn test_stop_loss_suspends_until_next_trading_day() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path()));
    let engine = paper();

    let mut ticks = entry_ticks();
    ticks.extend([
        tick(dec!(990), dec!(1), 210),
        tick(dec!(960), dec!(1), 220),
        // suspended: a spike on the same day is ignored
        tick(dec!(1000), dec!(10), 230),
    ]);
    let state = run_ticks(engine.clone(), store.clone(), ticks).await;

    let reasons: Vec<_> = state.daily_trades.iter().map(|t| t.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SignalReason::InitialBuy,
            SignalReason::Averaging,
            SignalReason::StopLoss,
        ]
    );
    assert!(state.position.is_none());
    assert_eq!(state.consecutive_losses, 1);
    assert!(state.daily_pnl < dec!(-5000));
    assert!(state.is_suspended);
    assert!(state
        .suspension_reason
        .as_deref()
        .unwrap()
        .starts_with("daily loss limit"));

    // next trading day: a fresh runner restores and trades again
    // history is not persisted, so the window refills first
    let mut ticks: Vec<_> = (0..20)
        .map(|i| tick(dec!(1000), dec!(1), 86_400 + i * 10))
        .collect();
    ticks.push(tick(dec!(1000), dec!(10), 86_600));
    let state = run_ticks(engine.clone(), store, ticks).await;

    assert!(!state.is_suspended);
    assert!(state.suspension_reason.is_none());
    assert_eq!(state.daily_trades.len(), 1);
    assert_eq!(state.daily_trades[0].reason, SignalReason::InitialBuy);
    assert_eq!(state.consecutive_losses, 1);
    assert_eq!(engine.fills().await.len(), 4);
}

#[tokio::test]
async fn test_partial_exit_then_breakeven_stop() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path()));
    let engine = paper();

    let mut ticks = entry_ticks();
    ticks.extend([
        tick(dec!(1005), dec!(1), 210),
        tick(dec!(1003), dec!(1), 220),
        tick(dec!(1000.5), dec!(1), 230),
    ]);
    let state = run_ticks(engine.clone(), store, ticks).await;

    let fills = engine.fills().await;
    assert_eq!(fills.len(), 3);
    assert_eq!(fills[2].quantity, dec!(70));
    assert_eq!(state.daily_trades[2].reason, SignalReason::BreakevenExit);
    assert!(state.position.is_none());
    // the partial gain outweighs the small breakeven loss
    assert!(state.daily_pnl > dec!(0));
}
