//! Portfolio Bounded Context
//!
//! Share positions per (user, security) and the credit records of the agents
//! who trade on margin.

mod actuary;
mod position;

pub use actuary::{Actuary, ActuaryRole};
pub use position::{Position, PositionKey};
