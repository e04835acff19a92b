//! Banking Gateway Port (Driven Port)
//!
//! Settles the funds of one matching step with the banking service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::OrderSide;
use crate::domain::shared::{AccountId, Money, UserId};

/// Funds movement for one matching step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// Side of the order being matched.
    pub direction: OrderSide,
    /// Owner of the order.
    pub user_id: UserId,
    /// Account the funds move through.
    pub account_id: AccountId,
    /// Step notional, `price * quantity`.
    pub amount: Money,
    /// Commission charged on the step.
    pub fee: Money,
}

/// Banking gateway error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The settlement token could not be signed.
    #[error("Settlement token error: {message}")]
    Token {
        /// Error details.
        message: String,
    },

    /// The banking service could not be reached.
    #[error("Banking service transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The banking service answered with a non-success status.
    #[error("Settlement rejected with status {status}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
    },
}

impl GatewayError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Transport { .. } => "transport",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Port for settling matching steps with the banking service.
///
/// Success or failure is the only outcome; there is no partial settlement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BankingGatewayPort: Send + Sync {
    /// Settle one step's funds.
    async fn settle(&self, request: &SettlementRequest) -> Result<(), GatewayError>;
}
