//! Message Bus Port (Driven Port)
//!
//! Topic-addressed delivery of opaque JSON bodies, fire-and-forget or
//! request/reply.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Messaging error.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Nobody can receive on the topic any more.
    #[error("Topic closed: {topic}")]
    Closed {
        /// Topic name.
        topic: String,
    },

    /// The responder went away without replying.
    #[error("No reply on topic {topic}")]
    NoReply {
        /// Topic name.
        topic: String,
    },

    /// The topic already has its single consumer.
    #[error("Topic already subscribed: {topic}")]
    AlreadySubscribed {
        /// Topic name.
        topic: String,
    },

    /// The broker transport failed.
    #[error("Transport error on {target}: {message}")]
    Transport {
        /// Topic or endpoint involved.
        target: String,
        /// Transport error text.
        message: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("Payload codec error on {topic}: {source}")]
    Codec {
        /// Topic name.
        topic: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// One message taken off a topic.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message arrived on.
    pub topic: String,
    /// JSON body.
    pub body: Vec<u8>,
    reply_to: Option<oneshot::Sender<Vec<u8>>>,
}

impl Delivery {
    /// A fire-and-forget delivery.
    #[must_use]
    pub fn new(topic: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            body,
            reply_to: None,
        }
    }

    /// A delivery whose sender waits on `reply_to`.
    #[must_use]
    pub fn with_reply(topic: impl Into<String>, body: Vec<u8>, reply_to: oneshot::Sender<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            body,
            reply_to: Some(reply_to),
        }
    }

    /// Whether the sender is waiting for a reply.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Answer the sender.
    pub fn reply(self, body: Vec<u8>) -> Result<(), MessagingError> {
        let topic = self.topic;
        match self.reply_to {
            Some(reply_to) => reply_to.send(body).map_err(|_| MessagingError::NoReply { topic }),
            None => Err(MessagingError::NoReply { topic }),
        }
    }
}

/// Single consumer of one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Wrap the receiving end of a topic queue.
    #[must_use]
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { topic: topic.into(), rx }
    }

    /// Topic being consumed.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next delivery. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is already queued.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Port for the message broker.
///
/// Delivery is at-least-once. A request blocks until exactly one reply
/// arrives or the call errors; the bus enforces no timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBusPort: Send + Sync {
    /// Publish without waiting for a reply.
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MessagingError>;

    /// Publish and wait for the reply.
    async fn request(&self, topic: &str, body: Vec<u8>) -> Result<Vec<u8>, MessagingError>;

    /// Become the consumer of `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, MessagingError>;
}
