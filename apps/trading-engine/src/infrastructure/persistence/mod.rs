//! Persistence Adapter
//!
//! In-memory relational-style tables with multi-row transactions and an
//! optional JSON snapshot for durability across restarts.

mod error;
mod store;
mod tables;

pub use error::StoreError;
pub use store::{Store, StoreTx};
pub use tables::{Row, Tables, WriteSet};
