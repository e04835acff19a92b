//! OTC offers.

use serde::{Deserialize, Serialize};

use crate::domain::portfolio::PositionKey;
use crate::domain::shared::{DomainError, Money, OtcTradeId, SecurityId, Timestamp, UserId};

/// An offer by a seller to write an option on shares they publicly offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtcTrade {
    /// Offer identifier.
    pub id: OtcTradeId,
    /// Party writing the option and delivering the shares.
    pub seller_id: UserId,
    /// Party buying the option.
    pub buyer_id: UserId,
    /// Underlying security.
    pub security_id: SecurityId,
    /// Units covered.
    pub quantity: u64,
    /// Exercise price per unit.
    pub strike_price: Money,
    /// Price of the option itself.
    pub premium: Money,
    /// Deadline for exercising the resulting contract.
    pub settlement_at: Timestamp,
    /// A contract has been created from this offer.
    #[serde(default)]
    pub accepted: bool,
    /// The resulting contract has been exercised.
    #[serde(default)]
    pub executed: bool,
}

impl OtcTrade {
    /// Position the offered shares come from.
    #[must_use]
    pub const fn seller_position(&self) -> PositionKey {
        PositionKey {
            user_id: self.seller_id,
            security_id: self.security_id,
        }
    }

    /// Mark the offer accepted.
    ///
    /// # Errors
    ///
    /// Returns error if the offer was already accepted or executed.
    pub fn accept(&mut self) -> Result<(), DomainError> {
        if self.accepted || self.executed {
            return Err(DomainError::InvalidStateTransition {
                entity: "OtcTrade".to_string(),
                from: if self.executed { "executed" } else { "accepted" }.to_string(),
                to: "accepted".to_string(),
            });
        }
        self.accepted = true;
        Ok(())
    }
}
