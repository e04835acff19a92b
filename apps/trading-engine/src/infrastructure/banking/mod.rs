//! Banking Service Adapter
//!
//! Signs a single-use settlement token per matching step and posts it to
//! the banking service.

mod http_client;
mod token;

pub use http_client::HttpBankingGateway;
pub use token::{SettlementClaims, SettlementTokenSigner};
