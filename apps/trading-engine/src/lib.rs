// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Trading Engine - Rust Core Library
//!
//! Order matching and OTC option settlement for the exchange.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic (aggregates, value objects, pricing rules)
//!   - `order_execution`: Order aggregate, status lifecycle, execution conditions
//!   - `market`: Securities and listings
//!   - `portfolio`: Positions and actuary limits
//!   - `otc`: Offers, option contracts, settlement saga phases
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: Interfaces for external systems (`BankingGatewayPort`, `MessageBusPort`)
//!   - `services`: `MatchingEngine`, `OtcSettlementCoordinator`, `SagaStateManager`
//!   - `use_cases`: order lifecycle, offer acceptance, exercise, startup recovery
//!   - `dto`: Message bus payloads
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `banking`: HTTP banking gateway with signed settlement tokens
//!   - `messaging`: ZeroMQ and in-process message buses
//!   - `persistence`: Transactional store with JSON snapshots
//!   - `locks`: Resource lock registry
//!   - `container`: Dependency injection container

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting Modules
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Prometheus metrics.
pub mod observability;

/// Retry helpers for operations that must eventually succeed.
pub mod retry;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order_execution::{Order, OrderKind, OrderSide, OrderStatus, PlaceOrderCommand};
pub use domain::otc::{OptionContract, OtcTrade, SagaPhase, SagaState};
pub use domain::shared::{DomainError, OrderId, SagaUid, SecurityId, UserId};

// Application re-exports
pub use application::ports::{BankingGatewayPort, MessageBusPort};
pub use application::services::{MatchReport, MatchingEngine, OtcSettlementCoordinator};
pub use application::use_cases::{
    AcceptOtcOfferUseCase, CommandError, ExerciseOptionUseCase, OrderLifecycleUseCase,
    RecoveryReport, StartupRecoveryUseCase,
};

// Infrastructure re-exports
pub use config::{Config, load_config};
pub use infrastructure::Container;
pub use infrastructure::banking::HttpBankingGateway;
pub use infrastructure::messaging::{InMemoryMessageBus, ZmqMessageBus};
pub use infrastructure::persistence::Store;
