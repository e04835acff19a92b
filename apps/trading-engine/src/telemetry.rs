//! Tracing Setup
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` seeded from the
//! configured level (`RUST_LOG` wins when set), JSON or pretty console
//! output, and an optional OTLP exporter.
//!
//! # Configuration
//!
//! - `RUST_LOG`: overrides `observability.logging.level`
//! - `OTEL_ENABLED`: set to `true` to export spans over OTLP
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: `http://localhost:4317`)
//! - `OTEL_SERVICE_NAME`: service name for traces (default: `trading-engine`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_engine::telemetry::init_telemetry;
//!
//! let _guard = init_telemetry(&config.observability.logging);
//! ```

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Guard that shuts down the tracer provider on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e:?}");
            }
        }
    }
}

/// Build the filter: `RUST_LOG` when set, the configured level otherwise.
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

fn console_layer(logging: &LoggingConfig) -> BoxedLayer {
    if logging.format == "pretty" {
        tracing_subscriber::fmt::layer().pretty().with_target(false).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    }
}

/// Initialize tracing.
///
/// Returns a guard that will shut down the tracer provider when dropped.
/// A second call is a no-op, which keeps tests that share a process happy.
#[must_use]
pub fn init_telemetry(logging: &LoggingConfig) -> TelemetryGuard {
    let otel_enabled = std::env::var("OTEL_ENABLED").is_ok_and(|v| v == "true");

    let provider = if otel_enabled { build_provider() } else { None };

    let mut layers: Vec<BoxedLayer> = vec![console_layer(logging)];
    if let Some(provider) = &provider {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "trading-engine".to_string());
        let tracer = provider.tracer(service_name);
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
    }

    let installed = Registry::default()
        .with(layers)
        .with(env_filter(logging))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            level = %logging.level,
            format = %logging.format,
            otel = provider.is_some(),
            "Tracing initialized"
        );
    }

    TelemetryGuard { provider }
}

fn build_provider() -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
    {
        Ok(exporter) => Some(
            SdkTracerProvider::builder()
                .with_simple_exporter(exporter)
                .build(),
        ),
        Err(e) => {
            eprintln!("Failed to create OTLP exporter: {e:?}, falling back to console logging");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_used_without_rust_log() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            format: "json".to_string(),
        };
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter(&logging).to_string(), "warn");
        }
    }

    #[test]
    fn repeated_init_does_not_panic() {
        let logging = LoggingConfig::default();
        let _first = init_telemetry(&logging);
        let _second = init_telemetry(&logging);
    }
}
