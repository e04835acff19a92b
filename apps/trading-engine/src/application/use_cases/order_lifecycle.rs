//! Order Lifecycle Use Case
//!
//! Place, approve, decline and cancel. Every command runs under the order's
//! security lock so it never interleaves with a matching step on the same
//! book. Approval hands the order to the matching engine.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::errors::CommandError;
use crate::application::services::{MatchReport, MatchingEngine, refresh_available_volume};
use crate::domain::market::Security;
use crate::domain::order_execution::{Order, OrderError, PlaceOrderCommand};
use crate::domain::shared::{OrderId, Timestamp, UserId};
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::Store;

/// An approved order and the matching run it started.
#[derive(Debug)]
pub struct ApprovedOrder {
    /// Order as committed by the approval.
    pub order: Order,
    /// Background matching run.
    pub matching: JoinHandle<MatchReport>,
}

/// Use case for the order lifecycle commands.
#[derive(Debug)]
pub struct OrderLifecycleUseCase {
    store: Arc<Store>,
    locks: Arc<ResourceLocks>,
    engine: Arc<MatchingEngine>,
}

impl OrderLifecycleUseCase {
    /// Create a new OrderLifecycleUseCase.
    #[must_use]
    pub const fn new(store: Arc<Store>, locks: Arc<ResourceLocks>, engine: Arc<MatchingEngine>) -> Self {
        Self { store, locks, engine }
    }

    /// Place a pending order.
    pub async fn place(&self, command: PlaceOrderCommand) -> Result<Order, CommandError> {
        let _guard = self.locks.securities.lock(&command.security_id).await;
        let mut tx = self.store.begin();
        tx.require::<Security>(&command.security_id)?;

        let order = Order::place(self.store.next_order_id(), command, Timestamp::now())?;
        tx.put(order.clone());
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            user_id = %order.user_id(),
            side = order.side().as_str(),
            quantity = order.quantity(),
            "Order placed"
        );
        Ok(order)
    }

    /// Approve a pending order and start matching it.
    pub async fn approve(&self, order_id: OrderId, approver: UserId) -> Result<ApprovedOrder, CommandError> {
        let order = self
            .mutate(order_id, |order, now| order.approve(approver, now))
            .await?;
        tracing::info!(order_id = %order_id, approver = %approver, "Order approved");
        Ok(ApprovedOrder {
            matching: self.engine.match_order(order_id),
            order,
        })
    }

    /// Decline a pending order.
    pub async fn decline(&self, order_id: OrderId) -> Result<Order, CommandError> {
        let order = self.mutate(order_id, |order, now| order.decline(now)).await?;
        tracing::info!(order_id = %order_id, "Order declined");
        Ok(order)
    }

    /// Cancel an order that is not yet terminal.
    ///
    /// A matching step already past its settlement still commits.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, CommandError> {
        let order = self.mutate(order_id, |order, now| order.cancel(now)).await?;
        tracing::info!(order_id = %order_id, remaining = order.remaining(), "Order cancelled");
        Ok(order)
    }

    async fn mutate(
        &self,
        order_id: OrderId,
        change: impl FnOnce(&mut Order, Timestamp) -> Result<(), OrderError>,
    ) -> Result<Order, CommandError> {
        let security_id = self.store.begin().require::<Order>(&order_id)?.security_id();
        let _guard = self.locks.securities.lock(&security_id).await;

        let mut tx = self.store.begin();
        let mut order = tx.require::<Order>(&order_id)?;
        change(&mut order, Timestamp::now())?;
        tx.put(order.clone());
        refresh_available_volume(&mut tx, security_id)?;
        tx.commit().await?;
        Ok(order)
    }
}
