//! Invariants over generated fill sequences and price paths

use crate::common::{strategy_config, tick, ts, MARKET};
use avg_scalper::execution::{Fill, OrderSide};
use avg_scalper::position::{EntryKind, FeeSchedule, PositionManager};
use avg_scalper::strategy::{
    Signal, SignalReason, StopLossAveragingStrategy, Strategy as _, TickContext,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BALANCE: Decimal = dec!(10000000);

#[derive(Debug, Clone)]
enum FillStep {
    Buy { price: Decimal, quantity: Decimal },
    /// Share of the held quantity, in permille
    Sell { permille: u32, price: Decimal },
}

// ── Generators ───────────────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (100i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000).prop_map(|units| Decimal::new(units, 6))
}

fn arb_fill_step() -> impl Strategy<Value = FillStep> {
    prop_oneof![
        (arb_price(), arb_quantity()).prop_map(|(price, quantity)| FillStep::Buy { price, quantity }),
        (1u32..1000, arb_price()).prop_map(|(permille, price)| FillStep::Sell { permille, price }),
    ]
}

/// Moves in basis points with a tick volume
fn arb_path() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((-250i64..=250, 1i64..=20), 20..120)
}

fn arb_fee_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=30).prop_map(|bp| Decimal::new(bp, 4))
}

// ── Helpers ──────────────────────────────────────────────────────────

fn strategy(max_averaging: u32) -> StopLossAveragingStrategy {
    let mut config = strategy_config("prop");
    config.params.max_averaging_count = max_averaging;
    StopLossAveragingStrategy::new(&config).unwrap()
}

/// Twenty flat ticks at `price`; returns the next free second
fn warm_up(s: &mut StopLossAveragingStrategy, price: Decimal) -> i64 {
    for i in 0..20 {
        s.observe(&tick(price, dec!(1), i * 10)).unwrap();
    }
    200
}

fn eval(
    s: &mut StopLossAveragingStrategy,
    price: Decimal,
    volume: Decimal,
    secs: i64,
) -> Option<Signal> {
    s.evaluate(&TickContext {
        tick: &tick(price, volume, secs),
        available_balance: BALANCE,
    })
    .unwrap()
}

fn fill_for(signal: &Signal) -> Fill {
    Fill {
        order_id: signal.id,
        market: MARKET.to_string(),
        side: signal.action,
        price: signal.price,
        quantity: signal.quantity,
        fee: signal.price * signal.quantity * dec!(0.0005),
        timestamp: signal.timestamp,
    }
}

/// Open at `price` through an evaluated and filled initial buy
fn open_at(s: &mut StopLossAveragingStrategy, price: Decimal) -> i64 {
    let next = warm_up(s, price);
    let entry = eval(s, price, dec!(10), next).unwrap();
    assert_eq!(entry.reason, SignalReason::InitialBuy);
    s.apply_fill(&entry, &fill_for(&entry)).unwrap();
    next + 10
}

proptest! {
    /// The average stays total_cost / total_quantity through buys and
    /// interleaved partial sells, and sells never move it
    #[test]
    fn average_price_matches_cost_basis(
        first_price in arb_price(),
        first_quantity in arb_quantity(),
        steps in prop::collection::vec(arb_fill_step(), 1..30),
    ) {
        let mut manager = PositionManager::new(MARKET, FeeSchedule::default());
        let now = ts(0);
        manager.add_entry(first_price, first_quantity, EntryKind::Initial, now).unwrap();

        for step in steps {
            let Some(before) = manager.position().cloned() else {
                break;
            };
            match step {
                FillStep::Buy { price, quantity } => {
                    manager.add_entry(price, quantity, EntryKind::Averaging, now).unwrap();
                }
                FillStep::Sell { permille, price } => {
                    let quantity = (before.total_quantity * Decimal::new(permille.into(), 3))
                        .round_dp(8);
                    if quantity.is_zero() {
                        continue;
                    }
                    manager.partial_sell(quantity, price, now).unwrap();
                    if let Some(after) = manager.position() {
                        prop_assert_eq!(after.average_price, before.average_price);
                    }
                }
            }

            if let Some(p) = manager.position() {
                let implied = p.total_cost / p.total_quantity;
                prop_assert!((implied - p.average_price).abs() <= dec!(0.000001));
                prop_assert!(p.total_quantity > Decimal::ZERO);
            }
        }
    }

    /// Selling everything at the breakeven price realizes about zero
    #[test]
    fn breakeven_round_trip_nets_zero(
        price in arb_price(),
        quantity in arb_quantity(),
        buy_fee in arb_fee_rate(),
        sell_fee in arb_fee_rate(),
    ) {
        let fees = FeeSchedule::new(buy_fee, sell_fee);
        let mut manager = PositionManager::new(MARKET, fees);
        let now = ts(0);
        manager.add_entry(price, quantity, EntryKind::Initial, now).unwrap();

        let breakeven = manager.breakeven_price().unwrap();
        prop_assert_eq!(breakeven, price * (Decimal::ONE + buy_fee) * (Decimal::ONE + sell_fee));

        let outcome = manager.partial_sell(quantity, breakeven, now).unwrap();
        prop_assert!(outcome.closed);
        // only the second-order sell fee term remains
        let tolerance = price * quantity * (sell_fee * sell_fee * dec!(2) + dec!(0.0000000001));
        prop_assert!(outcome.realized_pnl.abs() <= tolerance);
    }

    /// A decline past the trigger but above the stop averages for the
    /// initial notional
    #[test]
    fn averaging_matches_initial_notional(
        price in (1_000i64..=100_000).prop_map(Decimal::from),
        drop_bp in 100i64..=280,
    ) {
        let mut s = strategy(1);
        let next = open_at(&mut s, price);
        let initial_cost = s.position().unwrap().entries[0].cost;

        let lower = (price * (Decimal::ONE - Decimal::new(drop_bp, 4))).round_dp(2);
        let signal = eval(&mut s, lower, dec!(1), next).unwrap();
        prop_assert_eq!(signal.reason, SignalReason::Averaging);
        prop_assert!((signal.notional() - initial_cost).abs() <= dec!(0.01));
    }

    /// A fall through the stop sells the whole position and empties it
    #[test]
    fn stop_loss_sells_everything(
        price in (1_000i64..=100_000).prop_map(Decimal::from),
        drop_bp in 300i64..=1500,
    ) {
        let mut s = strategy(1);
        let next = open_at(&mut s, price);
        let held = s.position().unwrap().total_quantity;

        let lower = (price * (Decimal::ONE - Decimal::new(drop_bp, 4))).round_dp(2);
        let signal = eval(&mut s, lower, dec!(1), next).unwrap();
        prop_assert_eq!(signal.reason, SignalReason::StopLoss);
        prop_assert_eq!(signal.quantity, held);

        s.apply_fill(&signal, &fill_for(&signal)).unwrap();
        prop_assert!(s.position().is_none());
        prop_assert_eq!(s.describe().position.total_quantity, Decimal::ZERO);
    }

    /// Over any path averaging never exceeds the cap and full exits sell
    /// the whole position
    #[test]
    fn price_paths_respect_cap_and_full_exits(
        max_averaging in 1u32..=3,
        path in arb_path(),
    ) {
        let mut s = strategy(max_averaging);
        let mut secs = warm_up(&mut s, dec!(1000));
        let mut price = dec!(1000);

        for (move_bp, volume) in path {
            price = (price * (Decimal::ONE + Decimal::new(move_bp, 4))).round_dp(2);
            let before = s.describe().position;
            if let Some(signal) = eval(&mut s, price, Decimal::from(volume), secs) {
                if matches!(
                    signal.reason,
                    SignalReason::StopLoss | SignalReason::TrailingStop | SignalReason::BreakevenExit
                ) {
                    prop_assert_eq!(signal.quantity, before.total_quantity);
                }
                if signal.action == OrderSide::Sell {
                    prop_assert!(signal.quantity <= before.total_quantity);
                }
                s.apply_fill(&signal, &fill_for(&signal)).unwrap();
                if signal.reason.is_protective() {
                    prop_assert!(s.position().is_none());
                }
            }
            prop_assert!(s.describe().position.averaging_count <= max_averaging as usize);
            secs += 10;
        }
    }

    /// With three losses in a row nothing is emitted, whatever the market does
    #[test]
    fn loss_streak_silences_the_strategy(path in arb_path()) {
        let mut s = strategy(1);
        let mut state = s.serialize_state();
        state.consecutive_losses = 3;
        s.restore_state(state).unwrap();

        let mut secs = warm_up(&mut s, dec!(1000));
        let mut price = dec!(1000);
        for (move_bp, volume) in path {
            price = (price * (Decimal::ONE + Decimal::new(move_bp, 4))).round_dp(2);
            prop_assert!(eval(&mut s, price, Decimal::from(volume), secs).is_none());
            secs += 10;
        }
    }
}
