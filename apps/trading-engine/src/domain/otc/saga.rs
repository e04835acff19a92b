//! OTC settlement saga: phases, events and the transition table.
//!
//! The next action is a pure function of `(phase, event)`. Adding a phase
//! forces every match below to be revisited instead of silently falling
//! through a numeric comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{ContractId, DomainError, Money, SagaUid, Timestamp};

/// Position of a saga in its settlement sequence.
///
/// Declaration order is the settlement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SagaPhase {
    /// Exercise requested; banking domain is reserving the strike amount.
    Init,
    /// Shares taken out of the seller's position.
    OwnershipRemoved,
    /// Shares delivered into the buyer's position.
    OwnershipTransferred,
    /// Both sides confirmed; waiting for the final acknowledgement.
    Verified,
}

impl SagaPhase {
    /// Action to run when `event` arrives while the saga is in this phase.
    #[must_use]
    pub const fn on(self, event: SagaEvent) -> SagaStep {
        match (self, event) {
            (_, SagaEvent::Failed) => SagaStep::Compensate,
            (Self::Init, SagaEvent::Acknowledged) => SagaStep::RemoveSellerOwnership,
            (Self::OwnershipRemoved, SagaEvent::Acknowledged) => SagaStep::AssignBuyerOwnership,
            (Self::OwnershipTransferred, SagaEvent::Acknowledged) => SagaStep::MarkVerified,
            (Self::Verified, SagaEvent::Acknowledged) => SagaStep::Finalize,
        }
    }

    /// The seller's shares have been taken and must be returned on rollback.
    #[must_use]
    pub const fn seller_released(self) -> bool {
        match self {
            Self::Init => false,
            Self::OwnershipRemoved | Self::OwnershipTransferred | Self::Verified => true,
        }
    }

    /// The buyer has received shares that must be taken back on rollback.
    #[must_use]
    pub const fn buyer_assigned(self) -> bool {
        match self {
            Self::Init | Self::OwnershipRemoved => false,
            Self::OwnershipTransferred | Self::Verified => true,
        }
    }
}

impl fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::OwnershipRemoved => write!(f, "OwnershipRemoved"),
            Self::OwnershipTransferred => write!(f, "OwnershipTransferred"),
            Self::Verified => write!(f, "Verified"),
        }
    }
}

/// Inbound acknowledgement from the banking domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaEvent {
    /// The remote side completed its part of the current phase.
    Acknowledged,
    /// The remote side failed; compensate.
    Failed,
}

impl SagaEvent {
    /// Event carried by an acknowledgement's failure flag.
    #[must_use]
    pub const fn from_failure_flag(failure: bool) -> Self {
        if failure { Self::Failed } else { Self::Acknowledged }
    }
}

/// Local action the coordinator performs for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    /// Take the contract quantity out of the seller's offered shares.
    RemoveSellerOwnership,
    /// Deliver the contract quantity to the buyer.
    AssignBuyerOwnership,
    /// Record that both sides are settled.
    MarkVerified,
    /// Run the final consistency check and close the contract.
    Finalize,
    /// Roll the saga back.
    Compensate,
}

impl SagaStep {
    /// Phase the saga is in after the step commits, if it stays alive.
    #[must_use]
    pub const fn next_phase(self) -> Option<SagaPhase> {
        match self {
            Self::RemoveSellerOwnership => Some(SagaPhase::OwnershipRemoved),
            Self::AssignBuyerOwnership => Some(SagaPhase::OwnershipTransferred),
            Self::MarkVerified => Some(SagaPhase::Verified),
            Self::Finalize | Self::Compensate => None,
        }
    }
}

/// Durable record of an in-flight saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaState {
    /// Saga identifier shared with the banking domain.
    pub uid: SagaUid,
    /// Contract being exercised.
    pub contract_id: ContractId,
    /// Current phase.
    pub phase: SagaPhase,
    /// Seller's average purchase price when their shares were removed.
    #[serde(default)]
    pub seller_purchase_price: Option<Money>,
    /// Saga start time.
    pub started_at: Timestamp,
    /// Last phase change.
    pub updated_at: Timestamp,
}

impl SagaState {
    /// A saga that has just been initiated.
    #[must_use]
    pub const fn start(uid: SagaUid, contract_id: ContractId, now: Timestamp) -> Self {
        Self {
            uid,
            contract_id,
            phase: SagaPhase::Init,
            seller_purchase_price: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move to `phase`.
    ///
    /// # Errors
    ///
    /// Returns error if `phase` is behind the current phase.
    pub fn advance(&mut self, phase: SagaPhase, now: Timestamp) -> Result<(), DomainError> {
        if phase < self.phase {
            return Err(DomainError::InvalidStateTransition {
                entity: format!("Saga {}", self.uid),
                from: self.phase.to_string(),
                to: phase.to_string(),
            });
        }
        self.phase = phase;
        self.updated_at = now;
        Ok(())
    }
}
