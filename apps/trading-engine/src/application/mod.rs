//! Application Layer
//!
//! The application layer orchestrates domain logic through services and use
//! cases. It defines:
//!
//! - **Ports**: Interfaces for the banking service and the message bus
//! - **Services**: Matching engine, saga state and settlement coordinator
//! - **Use Cases**: Commands issued by collaborators and startup recovery
//! - **DTOs**: Message bus payloads

pub mod dto;
pub mod ports;
pub mod services;
pub mod use_cases;

pub use ports::*;
pub use services::*;
pub use use_cases::*;
