//! Observability module for metrics.
//!
//! Counters and histograms for matching steps, gateway calls and the
//! settlement saga, exported to Prometheus by the binary.

pub mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_gateway_request, record_match_step,
    record_recovery, record_retry, record_rollback, record_saga_transition,
    record_transaction,
};
