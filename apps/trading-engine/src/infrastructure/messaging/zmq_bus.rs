//! ZeroMQ message bus.
//!
//! Every message is two frames: the topic name, then the JSON body.
//!
//! - `publish` goes out on a PUB socket connected to the broker frontend.
//! - `subscribe` adds a prefix filter on a SUB socket connected to the broker
//!   backend; frames are routed to the topic's consumer by exact name.
//! - `request` opens a REQ socket per call against the request router and
//!   waits for a one-frame reply. There is no timeout.
//!
//! ZeroMQ sockets must stay on one thread, so the PUB and SUB sockets each
//! live on a dedicated thread fed by a channel. Both threads exit once the
//! bus is dropped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::application::ports::{Delivery, MessageBusPort, MessagingError, Subscription};
use crate::config::MessagingConfig;

/// How long the subscriber waits for frames before checking for new routes.
const POLL_INTERVAL_MS: i64 = 100;

type Outbound = (String, Vec<u8>);
type Route = (String, mpsc::UnboundedSender<Delivery>);

/// Message bus backed by an external ZeroMQ broker.
pub struct ZmqMessageBus {
    context: zmq::Context,
    request_endpoint: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    routes: mpsc::UnboundedSender<Route>,
    subscribed: Mutex<HashSet<String>>,
}

impl fmt::Debug for ZmqMessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqMessageBus")
            .field("request_endpoint", &self.request_endpoint)
            .finish_non_exhaustive()
    }
}

impl ZmqMessageBus {
    /// Connect the publish and subscribe sockets and start their threads.
    ///
    /// ZeroMQ connects lazily, so an unreachable broker is not an error here;
    /// only malformed endpoints and socket failures are.
    pub fn connect(config: &MessagingConfig) -> Result<Self, MessagingError> {
        let context = zmq::Context::new();

        let publisher = open_socket(&context, zmq::PUB, &config.publish_endpoint)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        spawn_named("zmq-publisher", move || run_publisher(&publisher, outbound_rx))?;

        let subscriber = open_socket(&context, zmq::SUB, &config.subscribe_endpoint)?;
        let (routes, routes_rx) = mpsc::unbounded_channel();
        spawn_named("zmq-subscriber", move || run_subscriber(&subscriber, routes_rx))?;

        tracing::info!(
            publish = %config.publish_endpoint,
            subscribe = %config.subscribe_endpoint,
            request = %config.request_endpoint,
            "ZeroMQ message bus connected"
        );

        Ok(Self {
            context,
            request_endpoint: config.request_endpoint.clone(),
            outbound,
            routes,
            subscribed: Mutex::new(HashSet::new()),
        })
    }
}

#[async_trait]
impl MessageBusPort for ZmqMessageBus {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<(), MessagingError> {
        tracing::trace!(topic, bytes = body.len(), "Publishing message");
        self.outbound
            .send((topic.to_string(), body))
            .map_err(|_| MessagingError::Closed {
                topic: topic.to_string(),
            })
    }

    async fn request(&self, topic: &str, body: Vec<u8>) -> Result<Vec<u8>, MessagingError> {
        let context = self.context.clone();
        let endpoint = self.request_endpoint.clone();
        let request_topic = topic.to_string();

        tokio::task::spawn_blocking(move || {
            let socket = open_socket(&context, zmq::REQ, &endpoint)?;
            socket
                .send_multipart([request_topic.as_bytes().to_vec(), body], 0)
                .map_err(|e| transport_error(&request_topic, e))?;
            socket
                .recv_bytes(0)
                .map_err(|_| MessagingError::NoReply { topic: request_topic })
        })
        .await
        .map_err(|e| transport_error(topic, e))?
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, MessagingError> {
        let fresh = self
            .subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string());
        if !fresh {
            return Err(MessagingError::AlreadySubscribed {
                topic: topic.to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .send((topic.to_string(), tx))
            .map_err(|_| MessagingError::Closed {
                topic: topic.to_string(),
            })?;
        tracing::debug!(topic, "Subscribed");
        Ok(Subscription::new(topic, rx))
    }
}

fn open_socket(context: &zmq::Context, kind: zmq::SocketType, endpoint: &str) -> Result<zmq::Socket, MessagingError> {
    let socket = context.socket(kind).map_err(|e| transport_error(endpoint, e))?;
    socket.set_linger(0).map_err(|e| transport_error(endpoint, e))?;
    socket.connect(endpoint).map_err(|e| transport_error(endpoint, e))?;
    Ok(socket)
}

fn spawn_named(name: &str, body: impl FnOnce() + Send + 'static) -> Result<(), MessagingError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(drop)
        .map_err(|e| transport_error(name, e))
}

fn transport_error(target: &str, error: impl fmt::Display) -> MessagingError {
    MessagingError::Transport {
        target: target.to_string(),
        message: error.to_string(),
    }
}

fn run_publisher(socket: &zmq::Socket, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some((topic, body)) = outbound.blocking_recv() {
        if let Err(e) = socket.send_multipart([topic.as_bytes().to_vec(), body], 0) {
            tracing::error!(topic = %topic, error = %e, "ZeroMQ publish failed");
        }
    }
    tracing::debug!("ZeroMQ publisher stopped");
}

fn run_subscriber(socket: &zmq::Socket, mut new_routes: mpsc::UnboundedReceiver<Route>) {
    let mut routes: HashMap<String, mpsc::UnboundedSender<Delivery>> = HashMap::new();
    loop {
        loop {
            match new_routes.try_recv() {
                Ok((topic, consumer)) => {
                    if let Err(e) = socket.set_subscribe(topic.as_bytes()) {
                        tracing::error!(topic = %topic, error = %e, "ZeroMQ subscribe failed");
                        continue;
                    }
                    routes.insert(topic, consumer);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("ZeroMQ subscriber stopped");
                    return;
                }
            }
        }

        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if let Err(e) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
            tracing::error!(error = %e, "ZeroMQ poll failed, subscriber stopping");
            return;
        }
        if !items[0].get_revents().contains(zmq::POLLIN) {
            continue;
        }

        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "ZeroMQ receive failed");
                continue;
            }
        };
        let Some((topic, body)) = split_frames(frames) else {
            tracing::warn!("Dropping message that is not a topic and a body");
            continue;
        };
        let Some(consumer) = routes.get(&topic) else {
            continue;
        };
        if consumer.send(Delivery::new(topic.clone(), body)).is_err() {
            tracing::debug!(topic = %topic, "Consumer gone, dropping route");
            routes.remove(&topic);
        }
    }
}

/// Split a `[topic, body]` message.
fn split_frames(mut frames: Vec<Vec<u8>>) -> Option<(String, Vec<u8>)> {
    if frames.len() != 2 {
        return None;
    }
    let body = frames.pop()?;
    let topic = String::from_utf8(frames.pop()?).ok()?;
    Some((topic, body))
}
