//! Prometheus metrics

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One strategy evaluation
    Evaluation,
    /// Order placement including retries
    OrderPlacement,
}

/// Gauge metric types, labelled by strategy id
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Realized pnl for the trading day
    DailyPnl,
    /// Quantity held
    OpenQuantity,
    /// Unrealized net pnl percent
    UnrealizedPnlPct,
    /// Stop-loss exits in a row
    ConsecutiveLosses,
    /// 1 while suspended
    Suspended,
}

/// Counter metric types, labelled by strategy id and a detail
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Signals emitted, by reason
    Signals,
    /// Fills applied, by reason
    Fills,
    /// Orders that failed after retries, by reason
    OrderFailures,
    /// Suspensions, by cause
    Suspensions,
    /// Ticks dropped as malformed
    RejectedTicks,
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::Evaluation => "avgscalper_evaluation_latency_ms",
        LatencyMetric::OrderPlacement => "avgscalper_order_placement_latency_ms",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::DailyPnl => "avgscalper_daily_pnl_krw",
        GaugeMetric::OpenQuantity => "avgscalper_open_quantity",
        GaugeMetric::UnrealizedPnlPct => "avgscalper_unrealized_pnl_pct",
        GaugeMetric::ConsecutiveLosses => "avgscalper_consecutive_losses",
        GaugeMetric::Suspended => "avgscalper_suspended",
    }
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::Signals => "avgscalper_signals_total",
        CounterMetric::Fills => "avgscalper_fills_total",
        CounterMetric::OrderFailures => "avgscalper_order_failures_total",
        CounterMetric::Suspensions => "avgscalper_suspensions_total",
        CounterMetric::RejectedTicks => "avgscalper_rejected_ticks_total",
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, strategy_id: &str, duration: Duration) {
    metrics::histogram!(latency_name(metric), "strategy" => strategy_id.to_string())
        .record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, strategy_id: &str, value: Decimal) {
    metrics::gauge!(gauge_name(metric), "strategy" => strategy_id.to_string())
        .set(value.to_f64().unwrap_or_default());
}

/// Increment a counter
pub fn increment(metric: CounterMetric, strategy_id: &str, detail: &str) {
    metrics::counter!(
        counter_name(metric),
        "strategy" => strategy_id.to_string(),
        "detail" => detail.to_string()
    )
    .increment(1);
}

/// Serve metrics on `0.0.0.0:port`; must run inside a tokio runtime
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}
