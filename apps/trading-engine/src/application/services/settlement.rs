//! OTC Settlement Coordinator
//!
//! Drives an option exercise through its saga as acknowledgements arrive on
//! `otc-ack-trading`:
//!
//! ```text
//! Init --ack--> remove seller shares     --> OwnershipRemoved
//!      --ack--> deliver shares to buyer  --> OwnershipTransferred
//!      --ack--> mark verified            --> Verified
//!      --ack--> final check, close contract, drop saga state
//! ```
//!
//! Each step's share movement and phase change commit in one transaction,
//! under the saga lock and then the contract security's lock. A
//! business-rule failure reports failure to the banking domain and rolls
//! the saga back; both run in the background and are retried until they
//! succeed. Storage errors propagate to the listener, which retries the
//! whole acknowledgement.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::messaging_client::MessagingClient;
use super::saga_state::{SagaLease, SagaStateManager};
use crate::application::dto::OtcAck;
use crate::application::ports::Subscription;
use crate::domain::otc::{OptionContract, OtcTrade, SagaEvent, SagaPhase, SagaState, SagaStep};
use crate::domain::portfolio::Position;
use crate::domain::shared::{DomainError, Money, SagaUid, Timestamp};
use crate::infrastructure::persistence::{Store, StoreError, StoreTx};
use crate::observability::metrics;
use crate::retry::{FixedBackoff, retry_forever};

/// Settlement errors.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A business rule stopped the step; the saga is compensated.
    #[error("settlement rule failed: {0}")]
    Rule(#[from] DomainError),

    /// The store failed; the acknowledgement should be retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What handling one acknowledgement did.
#[derive(Debug)]
pub enum AckOutcome {
    /// No saga exists for the UID.
    Ignored,
    /// The saga moved to this phase.
    Advanced(SagaPhase),
    /// The contract is exercised and the saga state is gone.
    Completed,
    /// The saga is being rolled back.
    Compensating {
        /// Background rollback, finished once the saga is compensated.
        rollback: JoinHandle<()>,
    },
}

/// Reacts to saga acknowledgements.
#[derive(Debug)]
pub struct OtcSettlementCoordinator {
    store: Arc<Store>,
    sagas: SagaStateManager,
    messaging: MessagingClient,
    backoff: FixedBackoff,
}

impl OtcSettlementCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub const fn new(
        store: Arc<Store>,
        sagas: SagaStateManager,
        messaging: MessagingClient,
        backoff: FixedBackoff,
    ) -> Self {
        Self {
            store,
            sagas,
            messaging,
            backoff,
        }
    }

    /// Saga state manager shared with the exercise command.
    #[must_use]
    pub const fn sagas(&self) -> &SagaStateManager {
        &self.sagas
    }

    /// Handle one acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `Store` when the step could not be read or committed. Business
    /// failures never surface here; they start compensation instead.
    pub async fn handle_ack(self: &Arc<Self>, ack: &OtcAck) -> Result<AckOutcome, SettlementError> {
        let mut lease = self.sagas.acquire(&ack.uid).await;
        let mut tx = self.store.begin();

        let Some(state) = lease.state(&tx) else {
            tracing::info!(saga_uid = %ack.uid, "Acknowledgement for unknown saga, ignoring");
            return Ok(AckOutcome::Ignored);
        };

        let step = state.phase.on(SagaEvent::from_failure_flag(ack.failure));
        tracing::info!(
            saga_uid = %ack.uid,
            phase = %state.phase,
            step = ?step,
            remote_message = %ack.message,
            "Saga acknowledgement"
        );

        if step == SagaStep::Compensate {
            drop(lease);
            return Ok(AckOutcome::Compensating {
                rollback: self.spawn_rollback(ack.uid.clone()),
            });
        }

        let security_guard = match tx.get::<OptionContract>(&state.contract_id) {
            Some(contract) => Some(self.sagas.locks().securities.lock(&contract.security_id).await),
            None => None,
        };

        match self.apply(&mut lease, &mut tx, &state, step) {
            Ok(outcome) => {
                tx.commit().await?;
                drop(security_guard);
                drop(lease);
                self.spawn_notify(OtcAck::success(ack.uid.clone(), "Success"));
                Ok(outcome)
            }
            Err(SettlementError::Rule(rule)) => {
                drop(tx);
                drop(security_guard);
                drop(lease);
                tracing::warn!(saga_uid = %ack.uid, phase = %state.phase, error = %rule, "Saga step failed, compensating");
                self.spawn_notify(OtcAck::failure(ack.uid.clone(), rule.to_string()));
                Ok(AckOutcome::Compensating {
                    rollback: self.spawn_rollback(ack.uid.clone()),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn apply(
        &self,
        lease: &mut SagaLease,
        tx: &mut StoreTx<'_>,
        state: &SagaState,
        step: SagaStep,
    ) -> Result<AckOutcome, SettlementError> {
        let contract = load_contract(tx, state)?;
        match step {
            SagaStep::RemoveSellerOwnership => {
                let key = contract.seller_position();
                let mut seller = tx.get::<Position>(&key).ok_or_else(|| DomainError::NotFound {
                    entity_type: "Position".to_string(),
                    id: key.to_string(),
                })?;
                let purchase_price = seller.purchase_price;
                seller.withdraw_offered(contract.quantity)?;
                // A drained row stays until the final check has seen it.
                tx.put(seller);
                lease.update(tx, |state| {
                    state.phase = SagaPhase::OwnershipRemoved;
                    state.seller_purchase_price = Some(purchase_price);
                })?;
                Ok(AckOutcome::Advanced(SagaPhase::OwnershipRemoved))
            }
            SagaStep::AssignBuyerOwnership => {
                let mut buyer = tx
                    .get::<Position>(&contract.buyer_position())
                    .unwrap_or_else(|| Position::open(contract.buyer_id, contract.security_id, 0, Money::ZERO));
                buyer.acquire(contract.quantity, contract.strike_price);
                tx.put(buyer);
                lease.update_phase(tx, SagaPhase::OwnershipTransferred)?;
                Ok(AckOutcome::Advanced(SagaPhase::OwnershipTransferred))
            }
            SagaStep::MarkVerified => {
                lease.update_phase(tx, SagaPhase::Verified)?;
                Ok(AckOutcome::Advanced(SagaPhase::Verified))
            }
            SagaStep::Finalize => {
                finalize(tx, contract)?;
                lease.remove(tx);
                metrics::record_saga_transition("completed");
                tracing::info!(saga_uid = %state.uid, "Saga completed");
                Ok(AckOutcome::Completed)
            }
            SagaStep::Compensate => Err(DomainError::rule("SAGA_COMPENSATING", "compensation is not a forward step").into()),
        }
    }

    /// Compensate the saga `uid` back to its pre-exercise state.
    ///
    /// Returns whether anything was rolled back; an unknown UID is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an integrity error when the buyer holds fewer shares than the
    /// saga delivered, and any storage error.
    pub async fn rollback(&self, uid: &SagaUid) -> Result<bool, StoreError> {
        let mut lease = self.sagas.acquire(uid).await;
        let mut tx = self.store.begin();

        let Some(state) = lease.state(&tx) else {
            tracing::debug!(saga_uid = %uid, "Nothing to roll back");
            metrics::record_rollback("noop");
            return Ok(false);
        };
        let contract = tx.require::<OptionContract>(&state.contract_id)?;
        let quantity = contract.quantity;
        let _security_guard = self.sagas.locks().securities.lock(&contract.security_id).await;

        if state.phase.seller_released() {
            let key = contract.seller_position();
            let seller = match tx.get::<Position>(&key) {
                Some(mut seller) => {
                    seller.restore_offered(quantity);
                    seller
                }
                None => {
                    let price = state.seller_purchase_price.unwrap_or(contract.strike_price);
                    Position {
                        public_count: quantity,
                        ..Position::open(key.user_id, key.security_id, quantity, price)
                    }
                }
            };
            tx.put(seller);
        }

        if state.phase.buyer_assigned() {
            let key = contract.buyer_position();
            match tx.get::<Position>(&key) {
                None => {
                    tracing::warn!(saga_uid = %uid, "Buyer position already gone, skipping");
                }
                Some(buyer) if buyer.quantity < quantity => {
                    metrics::record_rollback("integrity");
                    return Err(StoreError::integrity(format!(
                        "saga {uid}: buyer holds {} of {} delivered shares",
                        buyer.quantity, quantity
                    )));
                }
                Some(mut buyer) => {
                    buyer
                        .release(quantity)
                        .map_err(|e| StoreError::integrity(e.to_string()))?;
                    put_or_delete(&mut tx, buyer);
                }
            }
        }

        if contract.saga_uid.as_ref() == Some(uid) && contract.is_open() {
            let mut contract = contract;
            contract.saga_uid = None;
            tx.put(contract);
        }

        lease.remove(&mut tx);
        tx.commit().await?;

        metrics::record_rollback("completed");
        tracing::info!(saga_uid = %uid, phase = %state.phase, "Saga rolled back");
        Ok(true)
    }

    /// Roll `uid` back in the background, retrying until it succeeds.
    pub fn spawn_rollback(self: &Arc<Self>, uid: SagaUid) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let backoff = coordinator.backoff;
            let (_, attempts) = retry_forever("saga_rollback", backoff, || {
                let coordinator = Arc::clone(&coordinator);
                let uid = uid.clone();
                async move { coordinator.rollback(&uid).await }
            })
            .await;
            tracing::debug!(saga_uid = %uid, attempts, "Rollback finished");
        })
    }

    /// Publish `ack` on `otc-ack-banking` in the background, retrying until it is sent.
    pub fn spawn_notify(&self, ack: OtcAck) -> JoinHandle<()> {
        let messaging = self.messaging.clone();
        let backoff = self.backoff;
        tokio::spawn(async move {
            retry_forever("saga_notify", backoff, || {
                let messaging = messaging.clone();
                let ack = ack.clone();
                async move { messaging.ack_banking(&ack).await }
            })
            .await;
        })
    }

    /// Consume `subscription` until it closes, handling each acknowledgement.
    ///
    /// Malformed payloads are logged and dropped. A handler that fails with a
    /// storage error is retried with the fixed backoff.
    pub async fn run_ack_listener(self: Arc<Self>, mut subscription: Subscription) {
        tracing::info!(topic = subscription.topic(), "Acknowledgement listener started");
        while let Some(delivery) = subscription.next().await {
            let ack: OtcAck = match MessagingClient::decode(&delivery) {
                Ok(ack) => ack,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed acknowledgement");
                    continue;
                }
            };
            retry_forever("otc_ack", self.backoff, || {
                let coordinator = Arc::clone(&self);
                let ack = ack.clone();
                async move { coordinator.handle_ack(&ack).await.map(drop) }
            })
            .await;
        }
        tracing::info!("Acknowledgement listener stopped");
    }
}

/// Final consistency check, then close the contract.
///
/// Both sides' rows must exist and the buyer must hold the delivered
/// quantity. A seller row drained by the exercise is deleted here.
fn finalize(tx: &mut StoreTx<'_>, mut contract: OptionContract) -> Result<(), SettlementError> {
    let seller_key = contract.seller_position();
    let seller = tx.get::<Position>(&seller_key).ok_or_else(|| DomainError::NotFound {
        entity_type: "Position".to_string(),
        id: seller_key.to_string(),
    })?;

    let held = tx
        .get::<Position>(&contract.buyer_position())
        .map_or(0, |p| p.quantity);
    if held < contract.quantity {
        return Err(DomainError::InsufficientQuantity {
            what: "buyer quantity".to_string(),
            held,
            requested: contract.quantity,
        }
        .into());
    }

    contract.mark_exercised(Timestamp::now())?;
    put_or_delete(tx, seller);
    if let Some(mut trade) = tx.get::<OtcTrade>(&contract.otc_trade_id) {
        trade.executed = true;
        tx.put(trade);
    }
    tx.put(contract);
    Ok(())
}

fn load_contract(tx: &StoreTx<'_>, state: &SagaState) -> Result<OptionContract, DomainError> {
    tx.get::<OptionContract>(&state.contract_id)
        .ok_or_else(|| DomainError::NotFound {
            entity_type: "OptionContract".to_string(),
            id: state.contract_id.to_string(),
        })
}

fn put_or_delete(tx: &mut StoreTx<'_>, position: Position) {
    if position.is_empty() {
        tx.delete::<Position>(&position.key());
    } else {
        tx.put(position);
    }
}
