//! Application Services
//!
//! Long-running components: the matching engine, the settlement coordinator
//! and the saga state it tracks, plus the typed messaging client they share.

mod matching_engine;
mod messaging_client;
mod saga_state;
mod settlement;

pub use matching_engine::{
    MatchReport, MatchingEngine, StepOutcome, StepRejection, StopReason, refresh_available_volume,
};
pub use messaging_client::MessagingClient;
pub use saga_state::{SagaLease, SagaStateManager};
pub use settlement::{AckOutcome, OtcSettlementCoordinator, SettlementError};
