//! Application Ports
//!
//! Interfaces the application layer drives. Adapters live in
//! `infrastructure`.

pub mod banking_gateway_port;
pub mod message_bus_port;

pub use banking_gateway_port::{BankingGatewayPort, GatewayError, SettlementRequest};
pub use message_bus_port::{Delivery, MessageBusPort, MessagingError, Subscription};

#[cfg(test)]
pub use banking_gateway_port::MockBankingGatewayPort;
#[cfg(test)]
pub use message_bus_port::MockMessageBusPort;
