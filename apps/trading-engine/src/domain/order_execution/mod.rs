//! Order Execution Bounded Context
//!
//! Orders, their lifecycle, the pricing rules the matching engine applies and
//! the receipts it produces.

pub mod errors;
pub mod order;
pub mod pricing;
pub mod transaction;
pub mod value_objects;

pub use errors::OrderError;
pub use order::{Order, PlaceOrderCommand};
pub use pricing::{
    ConditionFailure, check_pre_execution, commission, initial_margin, reference_quote,
    settlement_price,
};
pub use transaction::Transaction;
pub use value_objects::{OrderKind, OrderSide, OrderStatus};
