//! Strongly-typed identifiers for domain entities.
//!
//! Row identifiers are numeric and assigned by the store. Saga UIDs are
//! strings because they travel over the wire to the banking domain.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Timestamp;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create an identifier from its numeric value.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Numeric value of the identifier.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(OrderId, "Identifier of an exchange order.");
define_id!(UserId, "Identifier of a customer or employee user.");
define_id!(AccountId, "Identifier of a bank account held by a user.");
define_id!(SecurityId, "Identifier of a tradeable security.");
define_id!(TransactionId, "Identifier of an executed match record.");
define_id!(OtcTradeId, "Identifier of an OTC offer.");
define_id!(ContractId, "Identifier of an option contract created from an OTC offer.");

/// Unique identifier of an OTC settlement saga.
///
/// Shared with the banking domain on every `init-otc` and acknowledgement message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaUid(String);

impl SagaUid {
    /// Create a saga UID from an existing string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build the UID for exercising `contract` at `at`: `OTC-{contract}-{unix seconds}`.
    #[must_use]
    pub fn for_exercise(contract: ContractId, at: Timestamp) -> Self {
        Self(format!("OTC-{contract}-{}", at.unix_seconds()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SagaUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SagaUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SagaUid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_display_and_order() {
        let a = OrderId::new(7);
        let b = OrderId::from(9);
        assert_eq!(format!("{a}"), "7");
        assert!(a < b);
        assert_eq!(b.value(), 9);
    }

    #[test]
    fn numeric_ids_serialize_transparently() {
        let json = serde_json::to_string(&AccountId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: AccountId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, AccountId::new(42));
    }

    #[test]
    fn saga_uid_for_exercise() {
        let at = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();
        let uid = SagaUid::for_exercise(ContractId::new(15), at);
        assert_eq!(uid.as_str(), format!("OTC-15-{}", at.unix_seconds()));
    }

    #[test]
    fn saga_uid_serde_is_plain_string() {
        let uid = SagaUid::from("OTC-1-100");
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"OTC-1-100\"");
    }
}
