//! Shipped configuration example

use avg_scalper::config::{Config, StrategyKind};
use avg_scalper::strategy::{Strategy, StrategyFactory};
use rust_decimal_macros::dec;

const EXAMPLE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example");

#[test]
fn test_config_example_loads() {
    let config = Config::load(EXAMPLE_PATH).unwrap();

    assert_eq!(config.execution.quote_currency, "KRW");
    assert_eq!(config.strategies.len(), 2);
    let btc = &config.strategies[0];
    assert_eq!(btc.kind, StrategyKind::StopLossAveraging);
    assert_eq!(btc.params.stop_loss_level, dec!(-3.0));
    assert_eq!(btc.params.partial_sell_ladder.len(), 2);
    assert_eq!(btc.risk.min_order_amount, dec!(5000));
}

#[test]
fn test_config_example_builds_enabled_strategies() {
    let config = Config::load(EXAMPLE_PATH).unwrap();
    let factory = StrategyFactory::from_config(&config).unwrap();

    assert_eq!(factory.ids().collect::<Vec<_>>(), vec!["btc-averaging"]);
    let strategy = factory.create("btc-averaging").unwrap();
    assert_eq!(strategy.market(), "KRW-BTC");
    assert_eq!(strategy.required_history_length(), 15);
}

#[test]
fn test_effective_config_round_trips() {
    let config = Config::load(EXAMPLE_PATH).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = Config::from_toml_str(&rendered).unwrap();

    assert_eq!(reparsed.strategies.len(), config.strategies.len());
    assert_eq!(
        reparsed.strategies[0].params.target_profit,
        config.strategies[0].params.target_profit
    );
}
