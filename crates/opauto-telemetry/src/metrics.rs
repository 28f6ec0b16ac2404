//! Prometheus metrics for production-order automation.
//!
//! # Panics
//!
//! Metric registration unwraps. It only fails on duplicate metric names.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

/// Orders created and written back to the planning table.
pub static ORDERS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "opauto_orders_created_total",
        "Production orders created and recorded in the planning table"
    )
    .unwrap()
});

/// Record failures by kind (gateway / divergence / unexpected).
pub static ORDER_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opauto_order_failures_total",
        "Planning records that failed, by failure kind",
        &["kind"]
    )
    .unwrap()
});

/// Full order-creation sequence latency.
pub static ORDER_CREATE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "opauto_order_create_latency_ms",
        "Latency of the draft/insert/validate/launch sequence in milliseconds",
        &["outcome"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0]
    )
    .unwrap()
});

/// Batch consolidation attempts by outcome.
pub static BATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opauto_batches_total",
        "Round batch consolidations, by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Finished runs by outcome (completed / halted).
pub static RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("opauto_runs_total", "Orchestration runs, by outcome", &["outcome"])
        .unwrap()
});

/// 1 while a run is in progress.
pub static RUN_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("opauto_run_active", "1 while an orchestration run is in progress")
        .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record an order created and written back.
    pub fn order_created(latency_ms: f64) {
        ORDERS_CREATED_TOTAL.inc();
        ORDER_CREATE_LATENCY_MS
            .with_label_values(&["success"])
            .observe(latency_ms);
    }

    /// Record a failed order-creation sequence.
    pub fn order_create_failed(latency_ms: f64) {
        ORDER_CREATE_LATENCY_MS
            .with_label_values(&["failure"])
            .observe(latency_ms);
    }

    /// Record a failed planning record.
    pub fn order_failure(kind: &str) {
        ORDER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a batch consolidation outcome (`consolidated`, `failed`, `untagged`).
    pub fn batch(outcome: &str) {
        BATCHES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Mark a run as started.
    pub fn run_started() {
        RUN_ACTIVE.set(1);
    }

    /// Mark a run as finished with the given outcome.
    pub fn run_finished(outcome: &str) {
        RUN_ACTIVE.set(0);
        RUNS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metrics() {
        Metrics::order_created(120.0);
        Metrics::order_failure("divergence");
        Metrics::batch("consolidated");

        let text = Metrics::render().unwrap();
        assert!(text.contains("opauto_orders_created_total"));
        assert!(text.contains("opauto_order_failures_total{kind=\"divergence\"}"));
        assert!(text.contains("opauto_batches_total{outcome=\"consolidated\"}"));
    }

    #[test]
    fn test_run_active_gauge() {
        Metrics::run_started();
        assert_eq!(RUN_ACTIVE.get(), 1);
        Metrics::run_finished("completed");
        assert_eq!(RUN_ACTIVE.get(), 0);
    }
}
