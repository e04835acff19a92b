//! Trading Engine Binary
//!
//! Starts the order matching and OTC settlement core.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-engine
//! ```
//!
//! # Environment Variables
//!
//! - `TRADING_ENGINE_CONFIG`: config file path (default: config.yaml)
//! - `RUST_LOG`: overrides the configured log level
//! - `OTEL_ENABLED`: export spans over OTLP when `true`

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use trading_engine::application::ports::MessageBusPort;
use trading_engine::config::{MessagingTransport, load_config};
use trading_engine::infrastructure::Container;
use trading_engine::infrastructure::banking::HttpBankingGateway;
use trading_engine::infrastructure::messaging::{InMemoryMessageBus, ZmqMessageBus};
use trading_engine::infrastructure::persistence::Store;
use trading_engine::observability::{MetricsConfig, init_metrics};
use trading_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(None).context("loading configuration")?;
    let _telemetry = init_telemetry(&config.observability.logging);

    if config.observability.metrics.enabled {
        let metrics = MetricsConfig::with_addr(config.observability.metrics.listen_addr);
        init_metrics(&metrics).context("starting metrics exporter")?;
        tracing::info!(addr = %metrics.listen_addr, "Metrics exporter listening");
    }

    let store = Arc::new(
        Store::open(&config.persistence)
            .await
            .context("opening store")?,
    );
    let gateway =
        Arc::new(HttpBankingGateway::new(&config.banking).context("building banking gateway")?);
    let bus: Arc<dyn MessageBusPort> = match config.messaging.transport {
        MessagingTransport::Zmq => Arc::new(
            ZmqMessageBus::connect(&config.messaging).context("connecting to message broker")?,
        ),
        MessagingTransport::InMemory => {
            tracing::warn!("In-process message bus selected, no external service can reach it");
            Arc::new(InMemoryMessageBus::new())
        }
    };

    let container = Container::new(config, store, gateway, bus);

    container.startup_recovery_use_case().execute().await;

    let acks = container
        .messaging()
        .subscribe_acks()
        .await
        .context("subscribing to settlement acknowledgements")?;
    let mut listener = tokio::spawn(container.coordinator().run_ack_listener(acks));

    tracing::info!("Trading engine ready");

    tokio::select! {
        reason = shutdown_signal() => {
            tracing::info!(reason, "Shutdown requested");
            listener.abort();
        }
        result = &mut listener => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Acknowledgement listener failed");
            } else {
                tracing::warn!("Acknowledgement subscription closed");
            }
        }
    }

    tracing::info!("Trading engine stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM and name which one arrived.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "ctrl_c",
        () = terminate => "sigterm",
    }
}
