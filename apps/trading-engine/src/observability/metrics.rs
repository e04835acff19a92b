//! Prometheus metrics for the trading engine.
//!
//! The functions here write to the `metrics` facade. Without an installed
//! recorder (tests, or metrics disabled) they are no-ops.
//!
//! # Example
//!
//! ```ignore
//! use trading_engine::observability::{init_metrics, MetricsConfig};
//!
//! let config = MetricsConfig::default();
//! init_metrics(&config)?;
//!
//! record_match_step("filled");
//! ```

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for gateway latency (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 5ms to 30s; the banking service may be slow
            latency_buckets: vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Matching Metrics
// ============================================================================

/// Record the outcome of one matching step.
///
/// # Arguments
///
/// * `outcome` - `"filled"` or the stop reason (e.g. `"self_match"`, `"gateway_rejected"`)
pub fn record_match_step(outcome: &'static str) {
    counter!("match_steps_total", "outcome" => outcome).increment(1);
}

/// Record a committed transaction receipt.
///
/// # Arguments
///
/// * `quantity` - Units matched by the step
pub fn record_transaction(quantity: u64) {
    counter!("transactions_total").increment(1);
    counter!("matched_units_total").increment(quantity);
}

/// Record a settlement request to the banking service.
///
/// # Arguments
///
/// * `result` - `"ok"`, `"rejected"`, `"transport"` or `"token"`
/// * `latency_seconds` - Round-trip time in seconds
pub fn record_gateway_request(result: &'static str, latency_seconds: f64) {
    counter!("gateway_requests_total", "result" => result).increment(1);
    histogram!("gateway_latency_seconds").record(latency_seconds);
}

// ============================================================================
// Saga Metrics
// ============================================================================

/// Record a committed saga phase change.
///
/// # Arguments
///
/// * `phase` - Phase the saga moved to, or `"closed"` on completion
pub fn record_saga_transition(phase: &str) {
    counter!("saga_transitions_total", "phase" => phase.to_string()).increment(1);
}

/// Record a saga compensation.
///
/// # Arguments
///
/// * `result` - `"ok"`, `"noop"` or `"error"`
pub fn record_rollback(result: &'static str) {
    counter!("saga_rollbacks_total", "result" => result).increment(1);
}

/// Record one failed attempt of an unbounded retry loop.
pub fn record_retry(operation: &'static str) {
    counter!("retries_total", "operation" => operation).increment(1);
}

/// Record the sagas compensated and orders resumed at startup.
pub fn record_recovery(sagas: usize, orders: usize) {
    counter!("recovery_sagas_total").increment(sagas as u64);
    counter!("recovery_orders_resumed_total").increment(orders as u64);
}
