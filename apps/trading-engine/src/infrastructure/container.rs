//! Dependency Injection Container
//!
//! Manages creation and wiring of all application components.

use std::sync::Arc;

use crate::application::ports::{BankingGatewayPort, MessageBusPort};
use crate::application::services::{MatchingEngine, MessagingClient, OtcSettlementCoordinator, SagaStateManager};
use crate::application::use_cases::{
    AcceptOtcOfferUseCase, ExerciseOptionUseCase, OrderLifecycleUseCase, StartupRecoveryUseCase,
};
use crate::config::Config;
use crate::infrastructure::locks::ResourceLocks;
use crate::infrastructure::persistence::Store;

/// Dependency injection container.
///
/// Holds the shared store, lock registry and long-running services. Use
/// cases are created on demand and share everything the container holds.
#[derive(Debug, Clone)]
pub struct Container {
    config: Config,
    store: Arc<Store>,
    locks: Arc<ResourceLocks>,
    messaging: MessagingClient,
    engine: Arc<MatchingEngine>,
    coordinator: Arc<OtcSettlementCoordinator>,
}

impl Container {
    /// Wire every component around `store`, `gateway` and `bus`.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<Store>,
        gateway: Arc<dyn BankingGatewayPort>,
        bus: Arc<dyn MessageBusPort>,
    ) -> Self {
        let locks = Arc::new(ResourceLocks::new());
        let messaging = MessagingClient::new(bus);
        let engine = Arc::new(MatchingEngine::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            gateway,
            config.matching.clone(),
        ));
        let coordinator = Arc::new(OtcSettlementCoordinator::new(
            Arc::clone(&store),
            SagaStateManager::new(Arc::clone(&locks)),
            messaging.clone(),
            config.saga.backoff(),
        ));
        Self {
            config,
            store,
            locks,
            messaging,
            engine,
            coordinator,
        }
    }

    /// Get the store.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Get the lock registry.
    pub fn locks(&self) -> Arc<ResourceLocks> {
        Arc::clone(&self.locks)
    }

    /// Get the messaging client.
    pub fn messaging(&self) -> MessagingClient {
        self.messaging.clone()
    }

    /// Get the matching engine.
    pub fn engine(&self) -> Arc<MatchingEngine> {
        Arc::clone(&self.engine)
    }

    /// Get the settlement coordinator.
    pub fn coordinator(&self) -> Arc<OtcSettlementCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Create an `OrderLifecycleUseCase`.
    pub fn order_lifecycle_use_case(&self) -> OrderLifecycleUseCase {
        OrderLifecycleUseCase::new(self.store(), self.locks(), self.engine())
    }

    /// Create an `AcceptOtcOfferUseCase`.
    pub fn accept_offer_use_case(&self) -> AcceptOtcOfferUseCase {
        AcceptOtcOfferUseCase::new(self.store(), self.locks(), self.messaging())
    }

    /// Create an `ExerciseOptionUseCase`.
    pub fn exercise_option_use_case(&self) -> ExerciseOptionUseCase {
        ExerciseOptionUseCase::new(self.store(), self.locks(), self.coordinator(), self.messaging())
    }

    /// Create a `StartupRecoveryUseCase`.
    pub fn startup_recovery_use_case(&self) -> StartupRecoveryUseCase {
        StartupRecoveryUseCase::new(
            self.store(),
            self.coordinator(),
            self.engine(),
            self.config.recovery.clone(),
        )
    }
}
