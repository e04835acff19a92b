//! Option contracts created from accepted OTC offers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::portfolio::PositionKey;
use crate::domain::shared::{
    ContractId, DomainError, Money, OtcTradeId, SagaUid, SecurityId, Timestamp, UserId,
};

/// Contract status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    /// Can be exercised until the settlement deadline.
    Active,
    /// Deadline passed without exercise.
    Expired,
    /// Exercised and settled.
    Closed,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A call option on shares from the seller's portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Contract identifier.
    pub id: ContractId,
    /// Offer the contract came from.
    pub otc_trade_id: OtcTradeId,
    /// Holder of the option; receives the shares.
    pub buyer_id: UserId,
    /// Writer of the option; delivers the shares.
    pub seller_id: UserId,
    /// Underlying security.
    pub security_id: SecurityId,
    /// Units delivered on exercise.
    pub quantity: u64,
    /// Price per unit paid on exercise.
    pub strike_price: Money,
    /// Premium paid when the offer was accepted.
    pub premium: Money,
    /// Exercise deadline.
    pub settlement_at: Timestamp,
    /// Lifecycle status.
    pub status: ContractStatus,
    /// Exercise completed.
    #[serde(default)]
    pub is_exercised: bool,
    /// Completion time of the exercise.
    #[serde(default)]
    pub exercised_at: Option<Timestamp>,
    /// Saga settling the exercise, once started.
    #[serde(default)]
    pub saga_uid: Option<SagaUid>,
    /// Acceptance time.
    pub created_at: Timestamp,
}

impl OptionContract {
    /// Seller position the shares are taken from.
    #[must_use]
    pub const fn seller_position(&self) -> PositionKey {
        PositionKey {
            user_id: self.seller_id,
            security_id: self.security_id,
        }
    }

    /// Buyer position the shares are delivered to.
    #[must_use]
    pub const fn buyer_position(&self) -> PositionKey {
        PositionKey {
            user_id: self.buyer_id,
            security_id: self.security_id,
        }
    }

    /// Active and not yet exercised.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ContractStatus::Active && !self.is_exercised
    }

    /// Amount the buyer pays on exercise: `strike * quantity`.
    #[must_use]
    pub fn exercise_amount(&self) -> Money {
        self.strike_price.times(self.quantity)
    }

    /// Check that `buyer` may start exercising the contract at `now`.
    ///
    /// # Errors
    ///
    /// Returns a business-rule violation naming the first failed check.
    pub fn ensure_exercisable(&self, buyer: UserId, now: Timestamp) -> Result<(), DomainError> {
        if self.buyer_id != buyer {
            return Err(DomainError::rule(
                "CONTRACT_OWNER",
                format!("user {buyer} does not hold contract {}", self.id),
            ));
        }
        if !self.is_open() {
            return Err(DomainError::rule(
                "CONTRACT_OPEN",
                format!("contract {} is {}", self.id, self.status),
            ));
        }
        if self.settlement_at < now {
            return Err(DomainError::rule(
                "SETTLEMENT_PASSED",
                format!("contract {} settlement deadline has passed", self.id),
            ));
        }
        if let Some(uid) = &self.saga_uid {
            return Err(DomainError::rule(
                "EXERCISE_IN_PROGRESS",
                format!("contract {} is already settling under {uid}", self.id),
            ));
        }
        Ok(())
    }

    /// Mark the exercise complete.
    ///
    /// # Errors
    ///
    /// Returns error if the contract was already exercised or is not active.
    pub fn mark_exercised(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::InvalidStateTransition {
                entity: "OptionContract".to_string(),
                from: self.status.to_string(),
                to: ContractStatus::Closed.to_string(),
            });
        }
        self.is_exercised = true;
        self.exercised_at = Some(now);
        self.status = ContractStatus::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn contract() -> OptionContract {
        let now = Timestamp::now();
        OptionContract {
            id: ContractId::new(9),
            otc_trade_id: OtcTradeId::new(1),
            buyer_id: UserId::new(2),
            seller_id: UserId::new(1),
            security_id: SecurityId::new(3),
            quantity: 4,
            strike_price: Money::new(dec!(25)),
            premium: Money::new(dec!(10)),
            settlement_at: now.plus_seconds(3600),
            status: ContractStatus::Active,
            is_exercised: false,
            exercised_at: None,
            saga_uid: None,
            created_at: now,
        }
    }

    #[test]
    fn exercise_amount_is_strike_times_quantity() {
        assert_eq!(contract().exercise_amount(), Money::new(dec!(100)));
    }

    #[test]
    fn only_buyer_can_exercise() {
        let err = contract()
            .ensure_exercisable(UserId::new(1), Timestamp::now())
            .unwrap_err();
        assert!(err.to_string().contains("CONTRACT_OWNER"));
    }

    #[test]
    fn expired_deadline_blocks_exercise() {
        let c = contract();
        let err = c
            .ensure_exercisable(c.buyer_id, c.settlement_at.plus_seconds(1))
            .unwrap_err();
        assert!(err.to_string().contains("SETTLEMENT_PASSED"));
    }

    #[test]
    fn running_saga_blocks_second_exercise() {
        let mut c = contract();
        c.saga_uid = Some(SagaUid::from("OTC-9-1"));
        let err = c.ensure_exercisable(c.buyer_id, Timestamp::now()).unwrap_err();
        assert!(err.to_string().contains("EXERCISE_IN_PROGRESS"));
    }

    #[test]
    fn mark_exercised_closes_once() {
        let mut c = contract();
        c.mark_exercised(Timestamp::now()).unwrap();
        assert!(c.is_exercised);
        assert_eq!(c.status, ContractStatus::Closed);
        assert!(c.exercised_at.is_some());
        assert!(c.mark_exercised(Timestamp::now()).is_err());
    }
}
