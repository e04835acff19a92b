//! Market Reference Data
//!
//! Securities and their listing quotes. The engine reads these to price
//! orders and only ever writes the derived available volume.

mod security;

pub use security::{Listing, Security};
