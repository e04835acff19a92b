//! Application Use Cases
//!
//! Commands issued by collaborators (order lifecycle, OTC acceptance and
//! exercise) and the startup recovery run.

mod accept_offer;
mod errors;
mod exercise_option;
mod order_lifecycle;
mod startup_recovery;

pub use accept_offer::AcceptOtcOfferUseCase;
pub use errors::CommandError;
pub use exercise_option::ExerciseOptionUseCase;
pub use order_lifecycle::{ApprovedOrder, OrderLifecycleUseCase};
pub use startup_recovery::{RecoveryReport, StartupRecoveryUseCase};
