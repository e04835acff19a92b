//! Order Aggregate Root
//!
//! An exchange order from placement through approval to its terminal status.
//! The matching engine is the only caller of [`Order::record_fill`].

use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{OrderKind, OrderSide, OrderStatus};
use crate::domain::shared::{AccountId, Money, OrderId, SecurityId, Timestamp, UserId};

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrderCommand {
    /// Owner of the order.
    pub user_id: UserId,
    /// Account that settles the order's funds.
    pub account_id: AccountId,
    /// Security being traded.
    pub security_id: SecurityId,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution condition.
    pub kind: OrderKind,
    /// Number of units requested.
    pub quantity: u64,
    /// Units per contract (1 for stocks).
    pub contract_size: u64,
    /// Stop threshold (required for STOP and STOP-LIMIT).
    pub stop_price: Option<Money>,
    /// Limit threshold (required for LIMIT and STOP-LIMIT).
    pub limit_price: Option<Money>,
    /// All-or-none flag.
    pub aon: bool,
    /// Margin-funded flag.
    pub margin: bool,
    /// Placed outside regular trading hours.
    pub after_hours: bool,
}

impl PlaceOrderCommand {
    /// Validate the command parameters.
    ///
    /// # Errors
    ///
    /// Returns error if required parameters are missing or invalid.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(invalid("quantity", "must be greater than zero"));
        }
        if self.contract_size == 0 {
            return Err(invalid("contract_size", "must be greater than zero"));
        }

        if self.kind.requires_limit_price() && self.limit_price.is_none() {
            return Err(invalid(
                "limit_price",
                format!("required for {} orders", self.kind),
            ));
        }
        if self.kind.requires_stop_price() && self.stop_price.is_none() {
            return Err(invalid(
                "stop_price",
                format!("required for {} orders", self.kind),
            ));
        }

        for (field, price) in [("limit_price", self.limit_price), ("stop_price", self.stop_price)] {
            if let Some(price) = price {
                price
                    .ensure_positive(field)
                    .map_err(|e| invalid(field, e.to_string()))?;
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> OrderError {
    OrderError::InvalidParameters {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Order Aggregate Root.
///
/// Invariant: `remaining <= quantity`, and `remaining == 0` exactly when the
/// status is `done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    account_id: AccountId,
    security_id: SecurityId,
    side: OrderSide,
    kind: OrderKind,
    quantity: u64,
    remaining: u64,
    contract_size: u64,
    stop_price: Option<Money>,
    limit_price: Option<Money>,
    status: OrderStatus,
    approved_by: Option<UserId>,
    aon: bool,
    margin: bool,
    after_hours: bool,
    last_modified: Timestamp,
}

impl Order {
    /// Place a new pending order.
    ///
    /// # Errors
    ///
    /// Returns error if command validation fails.
    pub fn place(id: OrderId, cmd: PlaceOrderCommand, now: Timestamp) -> Result<Self, OrderError> {
        cmd.validate()?;

        Ok(Self {
            id,
            user_id: cmd.user_id,
            account_id: cmd.account_id,
            security_id: cmd.security_id,
            side: cmd.side,
            kind: cmd.kind,
            quantity: cmd.quantity,
            remaining: cmd.quantity,
            contract_size: cmd.contract_size,
            stop_price: cmd.stop_price,
            limit_price: cmd.limit_price,
            status: OrderStatus::Pending,
            approved_by: None,
            aon: cmd.aon,
            margin: cmd.margin,
            after_hours: cmd.after_hours,
            last_modified: now,
        })
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the order ID.
    #[must_use]
    pub const fn id(&self) -> OrderId {
        self.id
    }

    /// Get the owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Get the settling account.
    #[must_use]
    pub const fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Get the traded security.
    #[must_use]
    pub const fn security_id(&self) -> SecurityId {
        self.security_id
    }

    /// Get the order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Get the order kind.
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        self.kind
    }

    /// Get the requested quantity.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Get the unfilled quantity.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Get the contract size.
    #[must_use]
    pub const fn contract_size(&self) -> u64 {
        self.contract_size
    }

    /// Get the stop threshold.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Money> {
        self.stop_price
    }

    /// Get the limit threshold.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Money> {
        self.limit_price
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Get the approving supervisor, if approved.
    #[must_use]
    pub const fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    /// Whether the order is all-or-none.
    #[must_use]
    pub const fn is_aon(&self) -> bool {
        self.aon
    }

    /// Whether the order is margin-funded.
    #[must_use]
    pub const fn is_margin(&self) -> bool {
        self.margin
    }

    /// Whether the order was placed after hours.
    #[must_use]
    pub const fn is_after_hours(&self) -> bool {
        self.after_hours
    }

    /// Get the last status change time.
    #[must_use]
    pub const fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    /// Approved with quantity left to fill.
    #[must_use]
    pub const fn is_matchable(&self) -> bool {
        matches!(self.status, OrderStatus::Approved) && self.remaining > 0
    }

    /// Market buys accept whatever the counter-order's price condition says.
    #[must_use]
    pub const fn is_market_buy(&self) -> bool {
        matches!(self.kind, OrderKind::Market) && matches!(self.side, OrderSide::Buy)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Approve a pending order.
    ///
    /// # Errors
    ///
    /// Returns error unless the order is pending.
    pub fn approve(&mut self, approver: UserId, now: Timestamp) -> Result<(), OrderError> {
        self.transition(OrderStatus::Pending, OrderStatus::Approved, now)?;
        self.approved_by = Some(approver);
        Ok(())
    }

    /// Decline a pending order.
    ///
    /// # Errors
    ///
    /// Returns error unless the order is pending.
    pub fn decline(&mut self, now: Timestamp) -> Result<(), OrderError> {
        self.transition(OrderStatus::Pending, OrderStatus::Declined, now)
    }

    /// Cancel an order that has not reached a terminal status.
    ///
    /// # Errors
    ///
    /// Returns error if the order is already done, cancelled or declined.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(self.rejected_transition(OrderStatus::Cancelled));
        }
        self.status = OrderStatus::Cancelled;
        self.last_modified = now;
        Ok(())
    }

    /// Apply an executed fill of `qty` units.
    ///
    /// A fill may land on an order that was cancelled while the step was in
    /// flight; the step's effects still commit. Reaching zero marks the order
    /// done. The last-modified time is left alone so partially filled orders
    /// keep their queue position.
    ///
    /// # Errors
    ///
    /// Returns error if the order cannot take fills or `qty` exceeds remaining.
    pub fn record_fill(&mut self, qty: u64) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Approved | OrderStatus::Cancelled) {
            return Err(OrderError::CannotFill {
                order_id: self.id,
                status: self.status,
            });
        }
        if qty == 0 || qty > self.remaining {
            return Err(OrderError::FillExceedsRemaining {
                order_id: self.id,
                fill_qty: qty,
                remaining_qty: self.remaining,
            });
        }

        self.remaining -= qty;
        if self.remaining == 0 {
            self.status = OrderStatus::Done;
        }
        Ok(())
    }

    fn transition(
        &mut self,
        expected: OrderStatus,
        to: OrderStatus,
        now: Timestamp,
    ) -> Result<(), OrderError> {
        if self.status != expected {
            return Err(self.rejected_transition(to));
        }
        self.status = to;
        self.last_modified = now;
        Ok(())
    }

    const fn rejected_transition(&self, to: OrderStatus) -> OrderError {
        OrderError::InvalidStateTransition {
            order_id: self.id,
            from: self.status,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn command(kind: OrderKind) -> PlaceOrderCommand {
        PlaceOrderCommand {
            user_id: UserId::new(1),
            account_id: AccountId::new(10),
            security_id: SecurityId::new(100),
            side: OrderSide::Buy,
            kind,
            quantity: 5,
            contract_size: 1,
            stop_price: None,
            limit_price: None,
            aon: false,
            margin: false,
            after_hours: false,
        }
    }

    fn approved_order(quantity: u64) -> Order {
        let mut cmd = command(OrderKind::Market);
        cmd.quantity = quantity;
        let mut order = Order::place(OrderId::new(1), cmd, Timestamp::now()).unwrap();
        order.approve(UserId::new(99), Timestamp::now()).unwrap();
        order
    }

    #[test]
    fn place_sets_pending_and_full_remaining() {
        let order = Order::place(OrderId::new(7), command(OrderKind::Market), Timestamp::now())
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.remaining(), 5);
        assert_eq!(order.quantity(), 5);
        assert!(!order.is_matchable());
    }

    #[test]
    fn place_rejects_zero_quantity() {
        let mut cmd = command(OrderKind::Market);
        cmd.quantity = 0;
        let err = Order::place(OrderId::new(1), cmd, Timestamp::now()).unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn place_requires_thresholds_for_kind() {
        let err = Order::place(OrderId::new(1), command(OrderKind::Limit), Timestamp::now())
            .unwrap_err();
        assert!(err.to_string().contains("limit_price"));

        let err = Order::place(OrderId::new(1), command(OrderKind::Stop), Timestamp::now())
            .unwrap_err();
        assert!(err.to_string().contains("stop_price"));

        let mut cmd = command(OrderKind::StopLimit);
        cmd.stop_price = Some(Money::new(dec!(10)));
        cmd.limit_price = Some(Money::ZERO);
        let err = Order::place(OrderId::new(1), cmd, Timestamp::now()).unwrap_err();
        assert!(err.to_string().contains("limit_price"));
    }

    #[test]
    fn approve_only_from_pending() {
        let mut order = approved_order(5);
        assert_eq!(order.status(), OrderStatus::Approved);
        assert_eq!(order.approved_by(), Some(UserId::new(99)));
        assert!(order.is_matchable());

        let err = order.approve(UserId::new(99), Timestamp::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvalidStateTransition { .. }));
    }

    #[test]
    fn decline_only_from_pending() {
        let mut order =
            Order::place(OrderId::new(1), command(OrderKind::Market), Timestamp::now()).unwrap();
        order.decline(Timestamp::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Declined);
        assert!(order.cancel(Timestamp::now()).is_err());
    }

    #[test]
    fn fills_reach_done_at_zero() {
        let mut order = approved_order(3);
        order.record_fill(1).unwrap();
        assert_eq!(order.remaining(), 2);
        assert_eq!(order.status(), OrderStatus::Approved);
        order.record_fill(2).unwrap();
        assert_eq!(order.remaining(), 0);
        assert_eq!(order.status(), OrderStatus::Done);
        assert!(order.record_fill(1).is_err());
    }

    #[test]
    fn fill_cannot_exceed_remaining() {
        let mut order = approved_order(2);
        let err = order.record_fill(3).unwrap_err();
        assert!(matches!(err, OrderError::FillExceedsRemaining { .. }));
        assert_eq!(order.remaining(), 2);
    }

    #[test]
    fn in_flight_fill_lands_on_cancelled_order() {
        let mut order = approved_order(2);
        order.cancel(Timestamp::now()).unwrap();
        order.record_fill(1).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.remaining(), 1);
    }

    #[test]
    fn pending_order_cannot_fill() {
        let mut order =
            Order::place(OrderId::new(1), command(OrderKind::Market), Timestamp::now()).unwrap();
        assert!(matches!(
            order.record_fill(1),
            Err(OrderError::CannotFill { .. })
        ));
    }

    #[test]
    fn market_buy_detection() {
        let order = approved_order(1);
        assert!(order.is_market_buy());
    }
}
