//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer, following
//! hexagonal architecture:
//!
//! - **Driven Adapters (Outbound)**
//!   - `banking/`: settlement tokens and the HTTP banking gateway
//!   - `messaging/`: ZeroMQ broker adapter and in-process message bus
//!   - `persistence/`: transactional table store with JSON snapshots
//!
//! - **Concurrency**
//!   - `locks`: per-key exclusive sections for securities, orders and sagas
//!
//! - **Wiring**
//!   - `container`: dependency injection container

pub mod banking;
pub mod container;
pub mod locks;
pub mod messaging;
pub mod persistence;

pub use container::Container;
