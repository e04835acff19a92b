//! Messaging Adapters
//!
//! The ZeroMQ bus talks to the external broker. The in-process bus serves
//! tests and single-process runs.

mod in_memory;
mod zmq_bus;

pub use in_memory::InMemoryMessageBus;
pub use zmq_bus::ZmqMessageBus;
