//! Data Transfer Objects
//!
//! Wire payloads for the message bus.

pub mod messages;

pub use messages::{
    AccountDto, ActuaryDto, CustomerDto, InitOtc, OtcAck, PremiumPayment, UserAccountsRequest,
    UserAccountsResponse, topics,
};
