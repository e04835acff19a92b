//! Message broker configuration.

use serde::{Deserialize, Serialize};

/// Which broker adapter carries the engine's topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingTransport {
    /// ZeroMQ sockets connected to an external broker.
    #[default]
    Zmq,
    /// Tokio channels inside this process; nothing external can connect.
    InMemory,
}

/// Message broker configuration.
///
/// The ZeroMQ endpoints follow a forwarder layout: the engine publishes into
/// the broker's frontend, consumes its backend, and sends request/reply
/// lookups to its request router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Broker adapter.
    #[serde(default)]
    pub transport: MessagingTransport,
    /// Endpoint the PUB socket connects to.
    #[serde(default = "default_publish_endpoint")]
    pub publish_endpoint: String,
    /// Endpoint the SUB socket connects to.
    #[serde(default = "default_subscribe_endpoint")]
    pub subscribe_endpoint: String,
    /// Endpoint each request's REQ socket connects to.
    #[serde(default = "default_request_endpoint")]
    pub request_endpoint: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            transport: MessagingTransport::default(),
            publish_endpoint: default_publish_endpoint(),
            subscribe_endpoint: default_subscribe_endpoint(),
            request_endpoint: default_request_endpoint(),
        }
    }
}

impl MessagingConfig {
    /// Every configured ZeroMQ endpoint, labelled by its config key.
    #[must_use]
    pub fn endpoints(&self) -> [(&'static str, &str); 3] {
        [
            ("publish_endpoint", &self.publish_endpoint),
            ("subscribe_endpoint", &self.subscribe_endpoint),
            ("request_endpoint", &self.request_endpoint),
        ]
    }
}

fn default_publish_endpoint() -> String {
    "tcp://127.0.0.1:5559".to_string()
}

fn default_subscribe_endpoint() -> String {
    "tcp://127.0.0.1:5560".to_string()
}

fn default_request_endpoint() -> String {
    "tcp://127.0.0.1:5561".to_string()
}
