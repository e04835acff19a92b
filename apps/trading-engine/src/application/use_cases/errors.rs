//! Errors returned to the collaborators that issue commands.

use thiserror::Error;

use crate::application::ports::MessagingError;
use crate::domain::order_execution::OrderError;
use crate::domain::shared::DomainError;
use crate::infrastructure::persistence::StoreError;

/// Command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The order rejected the command.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A portfolio, contract or offer rule rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A precondition checked by the command itself failed.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another domain could not be reached.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl CommandError {
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
