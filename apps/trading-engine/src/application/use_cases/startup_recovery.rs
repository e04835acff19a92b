//! Startup Recovery Use Case
//!
//! Runs once on boot, before acknowledgements are consumed. Every saga left
//! in the store by a previous process is failed: the banking domain is told
//! and the saga is compensated. Sagas are never resumed from the middle.
//! Optionally, approved orders that were still matching are handed back to
//! the engine.

use std::sync::Arc;

use serde::Serialize;

use crate::application::dto::OtcAck;
use crate::application::services::{MatchingEngine, OtcSettlementCoordinator};
use crate::config::RecoveryConfig;
use crate::domain::order_execution::Order;
use crate::domain::otc::SagaState;
use crate::infrastructure::persistence::Store;
use crate::observability::metrics;

/// What recovery did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Saga states found in the store.
    pub sagas_found: usize,
    /// Sagas compensated during startup.
    pub rolled_back: usize,
    /// Sagas whose rollback failed and was handed to the background retry.
    pub deferred: usize,
    /// Orders handed back to the matching engine.
    pub orders_resumed: usize,
}

/// Use case for crash recovery.
#[derive(Debug)]
pub struct StartupRecoveryUseCase {
    store: Arc<Store>,
    coordinator: Arc<OtcSettlementCoordinator>,
    engine: Arc<MatchingEngine>,
    config: RecoveryConfig,
}

impl StartupRecoveryUseCase {
    /// Create a new StartupRecoveryUseCase.
    #[must_use]
    pub const fn new(
        store: Arc<Store>,
        coordinator: Arc<OtcSettlementCoordinator>,
        engine: Arc<MatchingEngine>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            engine,
            config,
        }
    }

    /// Execute the use case.
    pub async fn execute(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        if !self.config.enabled {
            tracing::info!("Startup recovery disabled");
            return report;
        }

        let orphaned = self.store.begin().scan::<SagaState>(|_| true);
        report.sagas_found = orphaned.len();

        for state in orphaned {
            let uid = state.uid;
            tracing::warn!(saga_uid = %uid, phase = %state.phase, "Failing saga left by previous run");
            self.coordinator
                .spawn_notify(OtcAck::failure(uid.clone(), "Saga aborted by trading service restart"));

            match self.coordinator.rollback(&uid).await {
                Ok(_) => report.rolled_back += 1,
                Err(e) => {
                    tracing::error!(saga_uid = %uid, error = %e, "Rollback failed, retrying in background");
                    self.coordinator.spawn_rollback(uid);
                    report.deferred += 1;
                }
            }
        }

        if self.config.resume_matching {
            let pending = self.store.begin().scan::<Order>(Order::is_matchable);
            for order in pending {
                tracing::info!(order_id = %order.id(), remaining = order.remaining(), "Resuming matching");
                drop(self.engine.match_order(order.id()));
                report.orders_resumed += 1;
            }
        }

        metrics::record_recovery(report.sagas_found, report.orders_resumed);
        tracing::info!(
            sagas_found = report.sagas_found,
            rolled_back = report.rolled_back,
            deferred = report.deferred,
            orders_resumed = report.orders_resumed,
            "Startup recovery finished"
        );
        report
    }
}
