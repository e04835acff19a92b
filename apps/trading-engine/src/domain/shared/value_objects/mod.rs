//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.

mod identifiers;
mod money;
mod timestamp;

pub use identifiers::{
    AccountId, ContractId, OrderId, OtcTradeId, SagaUid, SecurityId, TransactionId, UserId,
};
pub use money::Money;
pub use timestamp::Timestamp;
