//! Domain Layer
//!
//! Business rules with no infrastructure dependencies: aggregates, value
//! objects and pure decision functions.
//!
//! # Bounded Contexts
//!
//! - [`order_execution`]: Order lifecycle, execution conditions and pricing
//! - [`market`]: Securities and their listings
//! - [`portfolio`]: Holdings and actuary credit limits
//! - [`otc`]: OTC offers, option contracts and the settlement saga

pub mod market;
pub mod order_execution;
pub mod otc;
pub mod portfolio;
pub mod shared;
