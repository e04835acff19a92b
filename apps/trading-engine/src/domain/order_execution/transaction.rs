//! Executed match records.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, OrderId, SecurityId, Timestamp, TransactionId, UserId};

/// Immutable receipt of one executed match step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Receipt identifier.
    pub id: TransactionId,
    /// Order whose matching loop produced the step.
    pub order_id: OrderId,
    /// Counter-order consumed by the step.
    pub counter_order_id: OrderId,
    /// Receiving party.
    pub buyer_id: UserId,
    /// Delivering party.
    pub seller_id: UserId,
    /// Security exchanged.
    pub security_id: SecurityId,
    /// Units exchanged.
    pub quantity: u64,
    /// Settlement price per unit.
    pub price_per_unit: Money,
    /// `price_per_unit * quantity`.
    pub total_price: Money,
    /// Commit time.
    pub created_at: Timestamp,
}
