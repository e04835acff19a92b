//! Actuaries: employees who trade for clients and their credit limits.

use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, UserId};

/// Role of an actuary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuaryRole {
    /// Trades against a credit limit.
    Agent,
    /// Approves agent orders; has no credit line of their own.
    Supervisor,
}

/// Credit record backing margin orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actuary {
    /// Employee user.
    pub user_id: UserId,
    /// Agent or supervisor.
    pub role: ActuaryRole,
    /// Approved credit limit.
    pub limit_amount: Money,
    /// Credit already consumed by margin fills.
    pub used_limit: Money,
    /// Orders placed by this actuary need supervisor approval.
    #[serde(default)]
    pub need_approval: bool,
}

impl Actuary {
    /// Credit still available.
    #[must_use]
    pub fn available_limit(&self) -> Money {
        self.limit_amount - self.used_limit
    }

    /// Whether this actuary may fund `margin` more on credit.
    #[must_use]
    pub fn can_cover(&self, margin: Money) -> bool {
        self.role == ActuaryRole::Agent && self.available_limit() >= margin
    }

    /// Consume `margin` of the credit limit.
    pub fn charge(&mut self, margin: Money) {
        self.used_limit += margin;
    }
}
