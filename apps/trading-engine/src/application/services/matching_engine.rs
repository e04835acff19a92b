//! Order Matching Engine
//!
//! Each approved order gets a background task that fills it step by step
//! against the opposite side of its security's book.
//!
//! # Step
//!
//! 1. Re-read the order; stop unless it is approved with units left.
//! 2. Size the step (one unit, the head counter's remaining in batch mode,
//!    or the whole remaining quantity for all-or-none orders).
//! 3. Settle the step's funds with the banking service.
//! 4. Under the security lock, pick the oldest eligible counter-order and
//!    validate it; any rejection stops the loop.
//! 5. Under the actuary locks of margin-funded parties, check their credit
//!    headroom.
//! 6. Commit the receipt, both fills, both positions, margin charges and
//!    the security's available volume in one transaction.
//! 7. Pause before the next step.
//!
//! The order lock is held for the whole loop, so concurrent triggers for the
//! same order run one after another.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::application::ports::{BankingGatewayPort, GatewayError, SettlementRequest};
use crate::config::{MatchingConfig, StepGranularity};
use crate::domain::market::{Listing, Security};
use crate::domain::order_execution::{
    ConditionFailure, Order, OrderSide, OrderStatus, Transaction, check_pre_execution, commission,
    initial_margin, settlement_price,
};
use crate::domain::portfolio::{Actuary, Position, PositionKey};
use crate::domain::shared::{Money, OrderId, SecurityId, Timestamp, UserId};
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::{Store, StoreError, StoreTx};
use crate::observability::metrics;

/// Why a counter-order could not absorb a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRejection {
    /// No approved opposite order with units left.
    NoCounterOrder,
    /// The head counter-order belongs to the same user.
    SelfMatch,
    /// The head counter-order is all-or-none and the step would split it.
    AonCounterIncompatible,
    /// The head counter-order has fewer units than the step.
    CounterInsufficient,
    /// The head counter-order's own price condition does not hold.
    CounterConditionFailed,
    /// A margin-funded party's actuary lacks credit headroom.
    MarginUnavailable,
    /// The seller holds fewer shares than the step.
    SellerShortfall,
}

impl StepRejection {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoCounterOrder => "no_counter_order",
            Self::SelfMatch => "self_match",
            Self::AonCounterIncompatible => "aon_counter_incompatible",
            Self::CounterInsufficient => "counter_insufficient",
            Self::CounterConditionFailed => "counter_condition_failed",
            Self::MarginUnavailable => "margin_unavailable",
            Self::SellerShortfall => "seller_shortfall",
        }
    }
}

/// Why a matching run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Remaining quantity reached zero.
    Filled,
    /// The order is missing, not approved, or has nothing left.
    OrderInactive,
    /// Opposite-side volume cannot cover an all-or-none order.
    AonUnsatisfiable,
    /// The order's price condition does not hold.
    ConditionFailed(ConditionFailure),
    /// No positive settlement price could be derived.
    NoSettlementPrice,
    /// The banking service refused or could not be reached.
    GatewayRejected(GatewayError),
    /// A counter-order could not absorb the step.
    Rejected(StepRejection),
    /// The store failed.
    StoreFailed(String),
}

impl StopReason {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Filled => "filled",
            Self::OrderInactive => "order_inactive",
            Self::AonUnsatisfiable => "aon_unsatisfiable",
            Self::ConditionFailed(_) => "condition_failed",
            Self::NoSettlementPrice => "no_settlement_price",
            Self::GatewayRejected(_) => "gateway_rejected",
            Self::Rejected(rejection) => rejection.label(),
            Self::StoreFailed(_) => "store_failed",
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A receipt was committed.
    Executed {
        /// Units matched.
        quantity: u64,
        /// Units the order still has after the step.
        remaining: u64,
    },
    /// Nothing was committed and the run ends.
    Stopped(StopReason),
}

/// Summary of one matching run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// Order that was matched.
    pub order_id: OrderId,
    /// Units filled across all steps.
    pub filled: u64,
    /// Committed steps.
    pub steps: u32,
    /// Why the run ended.
    pub stop: StopReason,
}

/// Background matcher of approved orders.
pub struct MatchingEngine {
    store: Arc<Store>,
    locks: Arc<ResourceLocks>,
    gateway: Arc<dyn BankingGatewayPort>,
    config: MatchingConfig,
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MatchingEngine {
    /// Create an engine over the shared store and locks.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        locks: Arc<ResourceLocks>,
        gateway: Arc<dyn BankingGatewayPort>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            locks,
            gateway,
            config,
        }
    }

    /// Start matching `order_id` in the background and return immediately.
    pub fn match_order(self: &Arc<Self>, order_id: OrderId) -> JoinHandle<MatchReport> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run(order_id).await })
    }

    /// Match `order_id` until it is filled or a step stops the run.
    pub async fn run(&self, order_id: OrderId) -> MatchReport {
        let span = tracing::info_span!("match_order", order_id = %order_id);
        async {
            let _order_guard = self.locks.orders.lock(&order_id).await;
            let mut report = MatchReport {
                order_id,
                filled: 0,
                steps: 0,
                stop: StopReason::OrderInactive,
            };

            if let Some(stop) = self.precheck(order_id) {
                report.stop = stop;
            } else {
                report.stop = self.step_loop(order_id, &mut report).await;
            }

            metrics::record_match_step(report.stop.label());
            tracing::info!(
                filled = report.filled,
                steps = report.steps,
                stop = report.stop.label(),
                "Matching run finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn step_loop(&self, order_id: OrderId, report: &mut MatchReport) -> StopReason {
        loop {
            match self.step(order_id).await {
                Ok(StepOutcome::Executed { quantity, remaining }) => {
                    report.filled += quantity;
                    report.steps += 1;
                    metrics::record_match_step("executed");
                    if remaining == 0 {
                        return StopReason::Filled;
                    }
                    self.pause(order_id).await;
                }
                Ok(StepOutcome::Stopped(reason)) => return reason,
                Err(e) => {
                    tracing::error!(error = %e, "Matching step failed");
                    return StopReason::StoreFailed(e.to_string());
                }
            }
        }
    }

    /// Checks run once before the first step.
    fn precheck(&self, order_id: OrderId) -> Option<StopReason> {
        let tx = self.store.begin();
        let Some(order) = tx.get::<Order>(&order_id).filter(Order::is_matchable) else {
            return Some(StopReason::OrderInactive);
        };

        if order.is_aon() {
            let available: u64 = tx
                .scan::<Order>(|candidate| is_eligible_counter(&order, candidate))
                .iter()
                .map(Order::remaining)
                .sum();
            if available < order.remaining() {
                tracing::debug!(available, needed = order.remaining(), "All-or-none order cannot be covered");
                return Some(StopReason::AonUnsatisfiable);
            }
        }

        let Some(security) = tx.get::<Security>(&order.security_id()) else {
            return Some(StopReason::ConditionFailed(ConditionFailure::MissingQuote));
        };
        let listing = tx.get::<Listing>(&security.ticker);
        if let Err(failure) = check_pre_execution(&order, &security, listing.as_ref(), Timestamp::now()) {
            tracing::debug!(reason = %failure, "Pre-execution condition not met");
            return Some(StopReason::ConditionFailed(failure));
        }
        None
    }

    /// Run one step.
    pub async fn step(&self, order_id: OrderId) -> Result<StepOutcome, StoreError> {
        let mut tx = self.store.begin();

        let Some(order) = tx.get::<Order>(&order_id).filter(Order::is_matchable) else {
            return Ok(StepOutcome::Stopped(StopReason::OrderInactive));
        };
        let security = tx.require::<Security>(&order.security_id())?;

        let quantity = match self.step_quantity(&tx, &order) {
            Some(quantity) => quantity,
            None => return Ok(StepOutcome::Stopped(StopReason::Rejected(StepRejection::NoCounterOrder))),
        };
        let Some(price) = settlement_price(&order, &security) else {
            return Ok(StepOutcome::Stopped(StopReason::NoSettlementPrice));
        };
        let amount = price.times(quantity);

        let request = SettlementRequest {
            direction: order.side(),
            user_id: order.user_id(),
            account_id: order.account_id(),
            amount,
            fee: commission(order.kind(), amount),
        };
        if let Err(e) = self.gateway.settle(&request).await {
            tracing::warn!(error = %e, quantity, "Settlement failed, stopping");
            return Ok(StepOutcome::Stopped(StopReason::GatewayRejected(e)));
        }

        let _security_guard = self.locks.securities.lock(&order.security_id()).await;
        let now = Timestamp::now();

        // Funds moved; a cancellation that landed meanwhile does not undo the step.
        let mut order = tx.require::<Order>(&order_id)?;
        if order.remaining() < quantity {
            return Ok(StepOutcome::Stopped(StopReason::OrderInactive));
        }
        let mut counter = match self.validate_counter(&tx, &order, &security, quantity, now) {
            Ok(counter) => counter,
            Err(rejection) => {
                tracing::info!(reason = rejection.label(), quantity, "Step rejected");
                return Ok(StepOutcome::Stopped(StopReason::Rejected(rejection)));
            }
        };

        // Credit is shared across securities, so it is checked and charged
        // under the actuary locks of every margin-funded party.
        let margin = initial_margin(price, quantity);
        let funded_by: Vec<UserId> = [&order, &counter]
            .into_iter()
            .filter(|o| o.is_margin())
            .map(Order::user_id)
            .collect();
        let _actuary_guards = self.locks.actuaries.lock_all(funded_by.iter().copied()).await;
        let covered = funded_by
            .iter()
            .all(|user| tx.get::<Actuary>(user).is_some_and(|actuary| actuary.can_cover(margin)));
        if !covered {
            let rejection = StepRejection::MarginUnavailable;
            tracing::info!(reason = rejection.label(), quantity, margin = %margin, "Step rejected");
            return Ok(StepOutcome::Stopped(StopReason::Rejected(rejection)));
        }

        order.record_fill(quantity).map_err(integrity)?;
        counter.record_fill(quantity).map_err(integrity)?;

        let (buyer, seller) = match order.side() {
            OrderSide::Buy => (&order, &counter),
            OrderSide::Sell => (&counter, &order),
        };
        let receipt = Transaction {
            id: self.store.next_transaction_id(),
            order_id: order.id(),
            counter_order_id: counter.id(),
            buyer_id: buyer.user_id(),
            seller_id: seller.user_id(),
            security_id: security.id,
            quantity,
            price_per_unit: price,
            total_price: amount,
            created_at: now,
        };

        transfer_shares(&mut tx, &receipt)?;

        for user in &funded_by {
            let mut actuary = tx.require::<Actuary>(user)?;
            actuary.charge(margin);
            tx.put(actuary);
        }

        let remaining = order.remaining();
        let counter_id = counter.id();
        tx.put(order);
        tx.put(counter);
        tx.put(receipt);
        refresh_available_volume(&mut tx, security.id)?;
        tx.commit().await?;

        metrics::record_transaction(quantity);
        tracing::info!(
            counter_order_id = %counter_id,
            quantity,
            price = %price,
            remaining,
            "Step executed"
        );
        Ok(StepOutcome::Executed { quantity, remaining })
    }

    fn step_quantity(&self, tx: &StoreTx<'_>, order: &Order) -> Option<u64> {
        if order.is_aon() {
            return Some(order.remaining());
        }
        match self.config.granularity {
            StepGranularity::Unit => Some(1),
            StepGranularity::Batch => {
                head_counter(tx, order).map(|counter| order.remaining().min(counter.remaining()))
            }
        }
    }

    fn validate_counter(
        &self,
        tx: &StoreTx<'_>,
        order: &Order,
        security: &Security,
        quantity: u64,
        now: Timestamp,
    ) -> Result<Order, StepRejection> {
        let counter = head_counter(tx, order).ok_or(StepRejection::NoCounterOrder)?;

        if counter.user_id() == order.user_id() {
            return Err(StepRejection::SelfMatch);
        }
        if counter.is_aon() && counter.remaining() != quantity {
            return Err(StepRejection::AonCounterIncompatible);
        }
        if counter.remaining() < quantity {
            return Err(StepRejection::CounterInsufficient);
        }
        if !order.is_market_buy() {
            let listing = tx.get::<Listing>(&security.ticker);
            if check_pre_execution(&counter, security, listing.as_ref(), now).is_err() {
                return Err(StepRejection::CounterConditionFailed);
            }
        }

        let seller = match order.side() {
            OrderSide::Sell => order,
            OrderSide::Buy => &counter,
        };
        let held = tx
            .get::<Position>(&PositionKey {
                user_id: seller.user_id(),
                security_id: security.id,
            })
            .map_or(0, |p| p.quantity);
        if held < quantity {
            return Err(StepRejection::SellerShortfall);
        }

        Ok(counter)
    }

    async fn pause(&self, order_id: OrderId) {
        let (min, max) = (self.config.step_delay_min_ms, self.config.step_delay_max_ms);
        let millis = if max > min { rand::rng().random_range(min..=max) } else { min };
        let mut delay = Duration::from_millis(millis);

        let after_hours = self
            .store
            .begin()
            .get::<Order>(&order_id)
            .is_some_and(|o| o.is_after_hours());
        if after_hours {
            delay += Duration::from_secs(self.config.after_hours_delay_secs);
        }

        if !delay.is_zero() {
            tracing::trace!(delay_ms = delay.as_millis() as u64, "Pausing before next step");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Approved opposite-side order with units left on the same security.
fn is_eligible_counter(order: &Order, candidate: &Order) -> bool {
    candidate.id() != order.id()
        && candidate.user_id() != order.user_id()
        && is_open_opposite(order, candidate)
}

fn is_open_opposite(order: &Order, candidate: &Order) -> bool {
    candidate.security_id() == order.security_id()
        && candidate.side() == order.side().opposite()
        && candidate.status() == OrderStatus::Approved
        && candidate.remaining() > 0
}

/// Oldest open opposite-side order by last modification, ties broken by id.
fn head_counter(tx: &StoreTx<'_>, order: &Order) -> Option<Order> {
    tx.scan::<Order>(|candidate| candidate.id() != order.id() && is_open_opposite(order, candidate))
        .into_iter()
        .min_by_key(|candidate| (candidate.last_modified(), candidate.id()))
}

/// Move the receipt's shares from seller to buyer.
fn transfer_shares(tx: &mut StoreTx<'_>, receipt: &Transaction) -> Result<(), StoreError> {
    let seller_key = PositionKey {
        user_id: receipt.seller_id,
        security_id: receipt.security_id,
    };
    let mut seller = tx.require::<Position>(&seller_key)?;
    seller.release(receipt.quantity).map_err(integrity)?;
    if seller.is_empty() {
        tx.delete::<Position>(&seller_key);
    } else {
        tx.put(seller);
    }

    let buyer_key = PositionKey {
        user_id: receipt.buyer_id,
        security_id: receipt.security_id,
    };
    let mut buyer = tx
        .get::<Position>(&buyer_key)
        .unwrap_or_else(|| Position::open(receipt.buyer_id, receipt.security_id, 0, Money::ZERO));
    buyer.acquire(receipt.quantity, receipt.price_per_unit);
    tx.put(buyer);
    Ok(())
}

/// Set a security's available volume to the units left on its approved sell orders.
pub fn refresh_available_volume(tx: &mut StoreTx<'_>, security_id: SecurityId) -> Result<(), StoreError> {
    let volume: u64 = tx
        .scan::<Order>(|o| {
            o.security_id() == security_id && o.side() == OrderSide::Sell && o.status() == OrderStatus::Approved
        })
        .iter()
        .map(Order::remaining)
        .sum();
    let mut security = tx.require::<Security>(&security_id)?;
    if security.volume != volume {
        security.volume = volume;
        tx.put(security);
    }
    Ok(())
}

fn integrity(error: impl std::fmt::Display) -> StoreError {
    StoreError::integrity(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockBankingGatewayPort;
    use crate::domain::order_execution::{OrderKind, PlaceOrderCommand};
    use crate::domain::shared::AccountId;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECURITY: SecurityId = SecurityId::new(1);

    async fn store_with_security() -> Arc<Store> {
        let store = Store::in_memory();
        let mut tx = store.begin();
        tx.put(Security {
            id: SECURITY,
            ticker: "X".into(),
            last_price: Money::from_cents(10_000),
            volume: 0,
            settlement_date: None,
        });
        tx.commit().await.unwrap();
        Arc::new(store)
    }

    fn market(user: u64, side: OrderSide, qty: u64) -> PlaceOrderCommand {
        PlaceOrderCommand {
            user_id: UserId::new(user),
            account_id: AccountId::new(user * 10),
            security_id: SECURITY,
            side,
            kind: OrderKind::Market,
            quantity: qty,
            contract_size: 1,
            stop_price: None,
            limit_price: None,
            aon: false,
            margin: false,
            after_hours: false,
        }
    }

    async fn approve_placed(store: &Store, cmd: PlaceOrderCommand) -> OrderId {
        let id = store.next_order_id();
        let mut order = Order::place(id, cmd, Timestamp::now()).unwrap();
        order.approve(UserId::new(99), Timestamp::now()).unwrap();
        let mut tx = store.begin();
        tx.put(order);
        tx.commit().await.unwrap();
        id
    }

    async fn approved(store: &Store, user: u64, side: OrderSide, qty: u64, aon: bool) -> OrderId {
        approve_placed(store, PlaceOrderCommand { aon, ..market(user, side, qty) }).await
    }

    async fn agent(store: &Store, user: u64, limit: Money) {
        let mut tx = store.begin();
        tx.put(Actuary {
            user_id: UserId::new(user),
            role: crate::domain::portfolio::ActuaryRole::Agent,
            limit_amount: limit,
            used_limit: Money::ZERO,
            need_approval: false,
        });
        tx.commit().await.unwrap();
    }

    fn used_limit(store: &Store, user: u64) -> Money {
        store.begin().require::<Actuary>(&UserId::new(user)).unwrap().used_limit
    }

    async fn holding(store: &Store, user: u64, qty: u64) {
        let mut tx = store.begin();
        tx.put(Position::open(UserId::new(user), SECURITY, qty, Money::from_cents(5_000)));
        tx.commit().await.unwrap();
    }

    fn accepting_gateway() -> (Arc<dyn BankingGatewayPort>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut gateway = MockBankingGatewayPort::new();
        gateway.expect_settle().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (Arc::new(gateway), calls)
    }

    fn engine(store: &Arc<Store>, gateway: Arc<dyn BankingGatewayPort>, granularity: StepGranularity) -> Arc<MatchingEngine> {
        Arc::new(MatchingEngine::new(
            Arc::clone(store),
            Arc::new(ResourceLocks::new()),
            gateway,
            MatchingConfig::immediate(granularity),
        ))
    }

    #[tokio::test]
    async fn unit_mode_settles_each_unit() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 3, false).await;
        approved(&store, 2, OrderSide::Sell, 3, false).await;
        holding(&store, 2, 3).await;
        let (gateway, calls) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Unit).match_order(buy).await.unwrap();

        assert_eq!(report.stop, StopReason::Filled);
        assert_eq!(report.steps, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let tables = store.snapshot();
        assert_eq!(tables.transactions.len(), 3);
        assert!(tables.transactions.values().all(|t| t.quantity == 1));
    }

    #[tokio::test]
    async fn gateway_failure_stops_without_fill() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 2, false).await;
        approved(&store, 2, OrderSide::Sell, 2, false).await;
        holding(&store, 2, 2).await;

        let mut gateway = MockBankingGatewayPort::new();
        gateway
            .expect_settle()
            .times(1)
            .returning(|_| Err(GatewayError::Rejected { status: 503 }));

        let report = engine(&store, Arc::new(gateway), StepGranularity::Unit).run(buy).await;

        assert_eq!(
            report.stop,
            StopReason::GatewayRejected(GatewayError::Rejected { status: 503 })
        );
        let order = store.begin().require::<Order>(&buy).unwrap();
        assert_eq!(order.remaining(), 2);
        assert_eq!(order.status(), OrderStatus::Approved);
        assert!(store.snapshot().transactions.is_empty());
    }

    #[tokio::test]
    async fn self_match_is_rejected() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 1, false).await;
        approved(&store, 1, OrderSide::Sell, 1, false).await;
        holding(&store, 1, 1).await;
        let (gateway, _) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Unit).run(buy).await;

        assert_eq!(report.stop, StopReason::Rejected(StepRejection::SelfMatch));
        assert!(store.snapshot().transactions.is_empty());
    }

    #[tokio::test]
    async fn seller_without_shares_is_rejected() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 1, false).await;
        approved(&store, 2, OrderSide::Sell, 1, false).await;
        let (gateway, _) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Unit).run(buy).await;

        assert_eq!(report.stop, StopReason::Rejected(StepRejection::SellerShortfall));
    }

    #[tokio::test]
    async fn aon_counter_is_never_split() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 2, false).await;
        approved(&store, 2, OrderSide::Sell, 4, true).await;
        holding(&store, 2, 4).await;
        let (gateway, _) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Batch).run(buy).await;

        assert_eq!(report.stop, StopReason::Rejected(StepRejection::AonCounterIncompatible));
        assert!(store.snapshot().transactions.is_empty());
    }

    #[tokio::test]
    async fn inactive_order_does_not_call_gateway() {
        let store = store_with_security().await;
        let mut gateway = MockBankingGatewayPort::new();
        gateway.expect_settle().never();

        let report = engine(&store, Arc::new(gateway), StepGranularity::Unit)
            .run(OrderId::new(404))
            .await;
        assert_eq!(report.stop, StopReason::OrderInactive);
    }

    #[tokio::test]
    async fn volume_tracks_open_sell_orders() {
        let store = store_with_security().await;
        approved(&store, 2, OrderSide::Sell, 4, false).await;
        approved(&store, 3, OrderSide::Sell, 6, false).await;
        approved(&store, 1, OrderSide::Buy, 9, false).await;

        let mut tx = store.begin();
        refresh_available_volume(&mut tx, SECURITY).unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.begin().require::<Security>(&SECURITY).unwrap().volume, 10);
    }

    #[tokio::test]
    async fn margin_step_charges_initial_margin() {
        let store = store_with_security().await;
        agent(&store, 1, Money::new(dec!(1000))).await;
        let buy = approve_placed(
            &store,
            PlaceOrderCommand {
                margin: true,
                ..market(1, OrderSide::Buy, 2)
            },
        )
        .await;
        approved(&store, 2, OrderSide::Sell, 2, false).await;
        holding(&store, 2, 2).await;
        let (gateway, _) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Unit).run(buy).await;

        assert_eq!(report.stop, StopReason::Filled);
        // Two steps of one unit at 100: 100 * 0.3 * 1.1 each.
        assert_eq!(used_limit(&store, 1), Money::new(dec!(66)));
    }

    #[tokio::test]
    async fn margin_counter_without_headroom_is_rejected() {
        let store = store_with_security().await;
        agent(&store, 2, Money::new(dec!(1))).await;
        let buy = approved(&store, 1, OrderSide::Buy, 1, false).await;
        approve_placed(
            &store,
            PlaceOrderCommand {
                margin: true,
                ..market(2, OrderSide::Sell, 1)
            },
        )
        .await;
        holding(&store, 2, 1).await;
        let (gateway, _) = accepting_gateway();

        let report = engine(&store, gateway, StepGranularity::Unit).run(buy).await;

        assert_eq!(report.stop, StopReason::Rejected(StepRejection::MarginUnavailable));
        assert!(store.snapshot().transactions.is_empty());
        assert_eq!(used_limit(&store, 2), Money::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn margin_credit_is_not_double_spent_across_securities() {
        const OTHER: SecurityId = SecurityId::new(2);

        for _ in 0..10 {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(
                Store::open(&crate::config::PersistenceConfig {
                    enabled: true,
                    snapshot_path: Some(dir.path().join("store.json")),
                })
                .await
                .unwrap(),
            );
            let mut tx = store.begin();
            for id in [SECURITY, OTHER] {
                tx.put(Security {
                    id,
                    ticker: format!("S{id}"),
                    last_price: Money::from_cents(10_000),
                    volume: 0,
                    settlement_date: None,
                });
            }
            tx.put(Position::open(UserId::new(2), SECURITY, 1, Money::from_cents(5_000)));
            tx.put(Position::open(UserId::new(3), OTHER, 1, Money::from_cents(5_000)));
            tx.commit().await.unwrap();
            agent(&store, 1, Money::new(dec!(40))).await;

            let mut buys = Vec::new();
            for (security_id, seller) in [(SECURITY, 2), (OTHER, 3)] {
                buys.push(
                    approve_placed(
                        &store,
                        PlaceOrderCommand {
                            security_id,
                            margin: true,
                            ..market(1, OrderSide::Buy, 1)
                        },
                    )
                    .await,
                );
                approve_placed(
                    &store,
                    PlaceOrderCommand {
                        security_id,
                        ..market(seller, OrderSide::Sell, 1)
                    },
                )
                .await;
            }
            let (gateway, _) = accepting_gateway();
            let engine = engine(&store, gateway, StepGranularity::Unit);

            let (first, second) = tokio::join!(engine.run(buys[0]), engine.run(buys[1]));

            let mut stops = [first.stop, second.stop];
            stops.sort_by_key(StopReason::label);
            assert_eq!(
                stops,
                [StopReason::Filled, StopReason::Rejected(StepRejection::MarginUnavailable)]
            );
            assert_eq!(used_limit(&store, 1), Money::new(dec!(33)));
            assert_eq!(store.snapshot().transactions.len(), 1);
        }
    }

    #[tokio::test]
    async fn cancellation_between_steps_ends_run() {
        let store = store_with_security().await;
        let buy = approved(&store, 1, OrderSide::Buy, 3, false).await;
        approved(&store, 2, OrderSide::Sell, 3, false).await;
        holding(&store, 2, 3).await;
        let (gateway, calls) = accepting_gateway();
        let engine = Arc::new(MatchingEngine::new(
            Arc::clone(&store),
            Arc::new(ResourceLocks::new()),
            gateway,
            MatchingConfig {
                step_delay_min_ms: 300,
                step_delay_max_ms: 300,
                ..MatchingConfig::immediate(StepGranularity::Unit)
            },
        ));

        let run = engine.match_order(buy);
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.snapshot().transactions.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut tx = store.begin();
        let mut order = tx.require::<Order>(&buy).unwrap();
        order.cancel(Timestamp::now()).unwrap();
        tx.put(order);
        tx.commit().await.unwrap();

        let report = run.await.unwrap();
        assert_eq!(report.stop, StopReason::OrderInactive);
        assert_eq!(report.filled, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let order = store.begin().require::<Order>(&buy).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.remaining(), 2);
    }

    async fn quoted(store: &Store, ask: Money, bid: Money) {
        let mut tx = store.begin();
        tx.put(Listing {
            ticker: "X".into(),
            price: Money::from_cents(10_000),
            ask,
            bid,
        });
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn limit_buy_below_ask_waits_without_settling() {
        let store = store_with_security().await;
        quoted(&store, Money::new(dec!(120)), Money::new(dec!(95))).await;
        let buy = approve_placed(
            &store,
            PlaceOrderCommand {
                kind: OrderKind::Limit,
                limit_price: Some(Money::new(dec!(110))),
                ..market(1, OrderSide::Buy, 1)
            },
        )
        .await;
        approved(&store, 2, OrderSide::Sell, 1, false).await;
        holding(&store, 2, 1).await;
        let mut gateway = MockBankingGatewayPort::new();
        gateway.expect_settle().never();

        let report = engine(&store, Arc::new(gateway), StepGranularity::Unit).run(buy).await;

        assert!(matches!(
            report.stop,
            StopReason::ConditionFailed(ConditionFailure::NotReached {
                kind: OrderKind::Limit,
                ..
            })
        ));
        assert_eq!(store.begin().require::<Order>(&buy).unwrap().remaining(), 1);
    }

    #[tokio::test]
    async fn stop_sell_above_bid_waits_without_settling() {
        let store = store_with_security().await;
        quoted(&store, Money::new(dec!(120)), Money::new(dec!(95))).await;
        let sell = approve_placed(
            &store,
            PlaceOrderCommand {
                kind: OrderKind::Stop,
                stop_price: Some(Money::new(dec!(90))),
                ..market(2, OrderSide::Sell, 1)
            },
        )
        .await;
        holding(&store, 2, 1).await;
        approved(&store, 1, OrderSide::Buy, 1, false).await;
        let mut gateway = MockBankingGatewayPort::new();
        gateway.expect_settle().never();

        let report = engine(&store, Arc::new(gateway), StepGranularity::Unit).run(sell).await;

        assert!(matches!(report.stop, StopReason::ConditionFailed(_)));
        assert!(store.snapshot().transactions.is_empty());
    }

    #[test]
    fn stop_labels_name_the_rejection() {
        assert_eq!(StopReason::Rejected(StepRejection::SelfMatch).label(), "self_match");
        assert_eq!(StopReason::Filled.label(), "filled");
    }
}
