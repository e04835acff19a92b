//! Saga State Manager
//!
//! Durable phase tracking for in-flight OTC sagas. Every operation runs under
//! the saga UID's lock and writes through the caller's storage transaction,
//! so a phase change commits together with the business mutation it
//! accompanies.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use crate::domain::otc::{SagaPhase, SagaState};
use crate::domain::shared::{ContractId, SagaUid, Timestamp};
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::{StoreError, StoreTx};
use crate::observability::metrics;

/// Hands out per-UID leases over saga state rows.
#[derive(Debug, Clone)]
pub struct SagaStateManager {
    locks: Arc<ResourceLocks>,
}

impl SagaStateManager {
    /// Create a manager sharing `locks` with the rest of the engine.
    #[must_use]
    pub const fn new(locks: Arc<ResourceLocks>) -> Self {
        Self { locks }
    }

    /// Lock registry shared with the rest of the engine.
    #[must_use]
    pub const fn locks(&self) -> &Arc<ResourceLocks> {
        &self.locks
    }

    /// Wait for exclusive access to `uid`.
    ///
    /// The lease holds the UID lock until dropped, so several operations can
    /// run as one read-modify-write.
    pub async fn acquire(&self, uid: &SagaUid) -> SagaLease {
        let guard = self.locks.sagas.lock(uid).await;
        SagaLease {
            uid: uid.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
            removed: false,
        }
    }

    /// Current phase of `uid`, if a saga with that UID exists.
    pub async fn get_phase(&self, tx: &StoreTx<'_>, uid: &SagaUid) -> Option<SagaPhase> {
        self.acquire(uid).await.phase(tx)
    }

    /// Move `uid` to `phase` within `tx`.
    pub async fn update_phase(&self, tx: &mut StoreTx<'_>, uid: &SagaUid, phase: SagaPhase) -> Result<(), StoreError> {
        self.acquire(uid).await.update_phase(tx, phase)
    }

    /// Delete the state of `uid` within `tx` and release its lock entry.
    pub async fn remove(&self, tx: &mut StoreTx<'_>, uid: &SagaUid) {
        self.acquire(uid).await.remove(tx);
    }
}

/// Exclusive hold on one saga UID.
///
/// Once [`SagaLease::remove`] has been called, dropping the lease also
/// evicts the UID's lock entry.
#[derive(Debug)]
pub struct SagaLease {
    uid: SagaUid,
    locks: Arc<ResourceLocks>,
    guard: Option<OwnedMutexGuard<()>>,
    removed: bool,
}

impl SagaLease {
    /// UID this lease covers.
    #[must_use]
    pub const fn uid(&self) -> &SagaUid {
        &self.uid
    }

    /// Stored state, if any.
    #[must_use]
    pub fn state(&self, tx: &StoreTx<'_>) -> Option<SagaState> {
        tx.get::<SagaState>(&self.uid)
    }

    /// Current phase, if the saga exists.
    #[must_use]
    pub fn phase(&self, tx: &StoreTx<'_>) -> Option<SagaPhase> {
        self.state(tx).map(|state| state.phase)
    }

    /// Create the saga at `Init`.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if a saga with this UID already exists.
    pub fn start(&self, tx: &mut StoreTx<'_>, contract_id: ContractId, now: Timestamp) -> Result<SagaState, StoreError> {
        if self.state(tx).is_some() {
            return Err(StoreError::integrity(format!("saga {} already exists", self.uid)));
        }
        let state = SagaState::start(self.uid.clone(), contract_id, now);
        tx.put(state.clone());
        metrics::record_saga_transition(&state.phase.to_string());
        Ok(state)
    }

    /// Move the saga to `phase`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown UID and an integrity error if
    /// `phase` would move the saga backwards.
    pub fn update_phase(&self, tx: &mut StoreTx<'_>, phase: SagaPhase) -> Result<(), StoreError> {
        self.update(tx, |state| state.phase = phase).map(|_| ())
    }

    /// Apply `change` to the stored state and advance it to the resulting phase.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_phase`].
    pub fn update(
        &self,
        tx: &mut StoreTx<'_>,
        change: impl FnOnce(&mut SagaState),
    ) -> Result<SagaState, StoreError> {
        let mut state = tx.require::<SagaState>(&self.uid)?;
        let mut next = state.clone();
        change(&mut next);
        state
            .advance(next.phase, Timestamp::now())
            .map_err(|e| StoreError::integrity(e.to_string()))?;
        state.seller_purchase_price = next.seller_purchase_price;
        tx.put(state.clone());
        metrics::record_saga_transition(&state.phase.to_string());
        tracing::debug!(saga_uid = %self.uid, phase = %state.phase, "Saga phase staged");
        Ok(state)
    }

    /// Delete the saga state.
    pub fn remove(&mut self, tx: &mut StoreTx<'_>) {
        tx.delete::<SagaState>(&self.uid);
        self.removed = true;
    }
}

impl Drop for SagaLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        if self.removed {
            self.locks.sagas.release(&self.uid);
        }
    }
}
