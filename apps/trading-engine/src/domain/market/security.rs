//! Security and listing reference rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, SecurityId, Timestamp};

/// A tradeable security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// Security identifier.
    pub id: SecurityId,
    /// Exchange ticker; joins to [`Listing`].
    pub ticker: String,
    /// Last trade price, used to settle market orders.
    pub last_price: Money,
    /// Units still offered by approved sell orders.
    #[serde(default)]
    pub volume: u64,
    /// Date after which the security can no longer be traded (derivatives).
    #[serde(default)]
    pub settlement_date: Option<NaiveDate>,
}

impl Security {
    /// Whether the security can still be traded at `now`.
    #[must_use]
    pub fn is_tradeable_at(&self, now: Timestamp) -> bool {
        self.settlement_date.is_none_or(|date| date >= now.date())
    }
}

/// Current quote for a ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Exchange ticker.
    pub ticker: String,
    /// Last quoted price.
    pub price: Money,
    /// Best ask.
    pub ask: Money,
    /// Best bid.
    pub bid: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn security(settlement_date: Option<NaiveDate>) -> Security {
        Security {
            id: SecurityId::new(1),
            ticker: "AAPL".to_string(),
            last_price: Money::new(dec!(190)),
            volume: 0,
            settlement_date,
        }
    }

    #[test]
    fn undated_security_is_always_tradeable() {
        assert!(security(None).is_tradeable_at(Timestamp::now()));
    }

    #[test]
    fn settlement_date_is_inclusive() {
        let now = Timestamp::parse("2026-05-10T12:00:00Z").unwrap();
        assert!(security(NaiveDate::from_ymd_opt(2026, 5, 10)).is_tradeable_at(now));
        assert!(security(NaiveDate::from_ymd_opt(2026, 6, 1)).is_tradeable_at(now));
        assert!(!security(NaiveDate::from_ymd_opt(2026, 5, 9)).is_tradeable_at(now));
    }
}
