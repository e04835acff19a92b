//! In-process message bus on tokio channels.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::application::ports::{Delivery, MessageBusPort, MessagingError, Subscription};

#[derive(Debug)]
struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// One unbounded queue per topic, created on first use.
///
/// Messages published before the consumer subscribes wait in the queue.
/// Each topic has a single consumer.
#[derive(Debug, Default)]
pub struct InMemoryMessageBus {
    queues: Mutex<HashMap<String, Queue>>,
}

impl InMemoryMessageBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, delivery: Delivery) -> Result<(), MessagingError> {
        let sender = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            queues
                .entry(delivery.topic.clone())
                .or_insert_with(Queue::new)
                .tx
                .clone()
        };
        sender.send(delivery).map_err(|e| MessagingError::Closed { topic: e.0.topic })
    }
}

#[async_trait]
impl MessageBusPort for InMemoryMessageBus {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MessagingError> {
        tracing::trace!(topic, bytes = body.len(), "Publishing message");
        self.send(Delivery::new(topic, body))
    }

    async fn request(&self, topic: &str, body: Vec<u8>) -> Result<Vec<u8>, MessagingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Delivery::with_reply(topic, body, reply_tx))?;
        reply_rx.await.map_err(|_| MessagingError::NoReply {
            topic: topic.to_string(),
        })
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, MessagingError> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(topic.to_string()).or_insert_with(Queue::new);
        queue
            .rx
            .take()
            .map(|rx| Subscription::new(topic, rx))
            .ok_or_else(|| MessagingError::AlreadySubscribed {
                topic: topic.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn queued_messages_reach_late_subscriber() {
        let bus = InMemoryMessageBus::new();
        bus.publish("init-otc", b"1".to_vec()).await.unwrap();
        bus.publish("init-otc", b"2".to_vec()).await.unwrap();

        let mut sub = bus.subscribe("init-otc").await.unwrap();
        assert_eq!(sub.next().await.unwrap().body, b"1".to_vec());
        assert_eq!(sub.next().await.unwrap().body, b"2".to_vec());
    }

    #[tokio::test]
    async fn request_waits_for_reply() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut sub = bus.subscribe("get-customer").await.unwrap();
        tokio::spawn(async move {
            let delivery = sub.next().await.unwrap();
            let mut body = delivery.body.clone();
            body.push(b'!');
            delivery.reply(body).unwrap();
        });

        let reply = bus.request("get-customer", b"7".to_vec()).await.unwrap();
        assert_eq!(reply, b"7!".to_vec());
    }

    #[tokio::test]
    async fn dropped_request_is_no_reply() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut sub = bus.subscribe("get-actuary").await.unwrap();
        tokio::spawn(async move {
            drop(sub.next().await);
        });

        let err = bus.request("get-actuary", b"7".to_vec()).await.unwrap_err();
        assert!(matches!(err, MessagingError::NoReply { .. }));
    }

    #[tokio::test]
    async fn single_consumer_per_topic() {
        let bus = InMemoryMessageBus::new();
        let _first = bus.subscribe("otc-ack-trading").await.unwrap();
        let second = bus.subscribe("otc-ack-trading").await;
        assert!(matches!(second, Err(MessagingError::AlreadySubscribed { .. })));
    }

    #[tokio::test]
    async fn publish_after_consumer_dropped_is_closed() {
        let bus = InMemoryMessageBus::new();
        drop(bus.subscribe("otc-ack-banking").await.unwrap());
        let err = bus.publish("otc-ack-banking", Vec::new()).await.unwrap_err();
        assert!(matches!(err, MessagingError::Closed { .. }));
    }
}
