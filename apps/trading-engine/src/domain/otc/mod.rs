//! OTC Bounded Context
//!
//! Over-the-counter offers, the option contracts they become once accepted and
//! the settlement saga that runs when a contract is exercised.

mod contract;
mod saga;
mod trade;

pub use contract::{ContractStatus, OptionContract};
pub use saga::{SagaEvent, SagaPhase, SagaState, SagaStep};
pub use trade::OtcTrade;
