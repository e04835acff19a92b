//! Pricing rules applied by the matching engine.
//!
//! Pre-execution conditions, the settlement price of a step, the commission
//! sent with each settlement token and the initial margin charged to agents.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use super::order::Order;
use super::value_objects::{OrderKind, OrderSide};
use crate::domain::market::{Listing, Security};
use crate::domain::shared::{Money, Timestamp};

/// Share of the notional charged as maintenance margin.
pub const MAINTENANCE_MARGIN_RATE: Decimal = dec!(0.3);

/// Multiplier on the maintenance margin that yields the initial margin.
pub const INITIAL_MARGIN_FACTOR: Decimal = dec!(1.1);

const MARKET_FEE_RATE: Decimal = dec!(0.14);
const MARKET_FEE_CAP: Decimal = dec!(7);
const LIMIT_FEE_RATE: Decimal = dec!(0.24);
const LIMIT_FEE_CAP: Decimal = dec!(12);

/// Why an order's pre-execution condition does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConditionFailure {
    /// The security is past its settlement date.
    #[error("security is past its settlement date")]
    SettlementPassed,
    /// No listing quote exists for the security's ticker.
    #[error("no listing quote for security")]
    MissingQuote,
    /// A threshold required by the order kind is absent.
    #[error("order is missing its {0} threshold")]
    MissingThreshold(&'static str),
    /// The quote has not reached the order's threshold.
    #[error("quote {quote} does not satisfy the {kind} condition")]
    NotReached {
        /// Quote the condition was evaluated against.
        quote: Money,
        /// Kind whose condition failed.
        kind: OrderKind,
    },
}

/// Quote an order is compared against: the bid for sells, the ask for buys.
#[must_use]
pub const fn reference_quote(side: OrderSide, listing: &Listing) -> Money {
    match side {
        OrderSide::Sell => listing.bid,
        OrderSide::Buy => listing.ask,
    }
}

/// Check that `order` may execute against the current quote.
///
/// Limit: sells need `quote >= limit`, buys need `quote <= limit`.
/// Stop: sells need `quote <= stop`, buys need `quote >= stop`.
/// Stop-limit needs both. Market always holds.
///
/// # Errors
///
/// Returns the first failing condition.
pub fn check_pre_execution(
    order: &Order,
    security: &Security,
    listing: Option<&Listing>,
    now: Timestamp,
) -> Result<(), ConditionFailure> {
    if !security.is_tradeable_at(now) {
        return Err(ConditionFailure::SettlementPassed);
    }
    if matches!(order.kind(), OrderKind::Market) {
        return Ok(());
    }

    let listing = listing.ok_or(ConditionFailure::MissingQuote)?;
    let quote = reference_quote(order.side(), listing);
    let side = order.side();

    let limit_ok = |limit: Money| match side {
        OrderSide::Sell => quote >= limit,
        OrderSide::Buy => quote <= limit,
    };
    let stop_ok = |stop: Money| match side {
        OrderSide::Sell => quote <= stop,
        OrderSide::Buy => quote >= stop,
    };

    let holds = match order.kind() {
        OrderKind::Market => true,
        OrderKind::Limit => limit_ok(threshold(order.limit_price(), "limit")?),
        OrderKind::Stop => stop_ok(threshold(order.stop_price(), "stop")?),
        OrderKind::StopLimit => {
            let stop = threshold(order.stop_price(), "stop")?;
            let limit = threshold(order.limit_price(), "limit")?;
            stop_ok(stop) && limit_ok(limit)
        }
    };

    if holds {
        Ok(())
    } else {
        Err(ConditionFailure::NotReached {
            quote,
            kind: order.kind(),
        })
    }
}

fn threshold(price: Option<Money>, name: &'static str) -> Result<Money, ConditionFailure> {
    price.ok_or(ConditionFailure::MissingThreshold(name))
}

/// Per-unit price a step settles at.
///
/// Market orders use the security's last trade price; other kinds use the
/// stop threshold, falling back to the limit threshold.
#[must_use]
pub fn settlement_price(order: &Order, security: &Security) -> Option<Money> {
    let price = match order.kind() {
        OrderKind::Market => Some(security.last_price),
        _ => order.stop_price().or(order.limit_price()),
    };
    price.filter(Money::is_positive)
}

/// Commission on a step's notional: 14% capped at 7 for market orders,
/// 24% capped at 12 for limit orders, nothing for stop kinds.
#[must_use]
pub fn commission(kind: OrderKind, total: Money) -> Money {
    let (rate, cap) = match kind {
        OrderKind::Market => (MARKET_FEE_RATE, MARKET_FEE_CAP),
        OrderKind::Limit => (LIMIT_FEE_RATE, LIMIT_FEE_CAP),
        OrderKind::Stop | OrderKind::StopLimit => return Money::ZERO,
    };
    (total * rate).min(Money::new(cap))
}

/// Initial margin for `quantity` units at `price`: `price * qty * 0.3 * 1.1`.
#[must_use]
pub fn initial_margin(price: Money, quantity: u64) -> Money {
    price.times(quantity) * MAINTENANCE_MARGIN_RATE * INITIAL_MARGIN_FACTOR
}
