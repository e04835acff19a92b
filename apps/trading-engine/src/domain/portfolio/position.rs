//! Portfolio positions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{DomainError, Money, SecurityId, UserId};

/// Key of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Holder.
    pub user_id: UserId,
    /// Held security.
    pub security_id: SecurityId,
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {} / security {}", self.user_id, self.security_id)
    }
}

/// Shares of one security held by one user.
///
/// A position whose quantity reaches zero is deleted by whoever drained it.
/// An option exercise keeps the drained seller row until its final check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Holder.
    pub user_id: UserId,
    /// Held security.
    pub security_id: SecurityId,
    /// Units held.
    pub quantity: u64,
    /// Quantity-weighted average purchase price.
    pub purchase_price: Money,
    /// Units offered to other users through OTC trading.
    #[serde(default)]
    pub public_count: u64,
}

impl Position {
    /// Open a position with `quantity` units bought at `price`.
    #[must_use]
    pub const fn open(user_id: UserId, security_id: SecurityId, quantity: u64, price: Money) -> Self {
        Self {
            user_id,
            security_id,
            quantity,
            purchase_price: price,
            public_count: 0,
        }
    }

    /// Row key.
    #[must_use]
    pub const fn key(&self) -> PositionKey {
        PositionKey {
            user_id: self.user_id,
            security_id: self.security_id,
        }
    }

    /// True once the position holds nothing and must be removed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// Add `quantity` units bought at `price`, re-weighting the average price.
    pub fn acquire(&mut self, quantity: u64, price: Money) {
        let total = self.quantity + quantity;
        if total == 0 {
            return;
        }
        let held_cost = self.purchase_price.times(self.quantity);
        let new_cost = price.times(quantity);
        self.purchase_price = Money::new((held_cost + new_cost).amount() / Decimal::from(total));
        self.quantity = total;
    }

    /// Remove `quantity` units.
    ///
    /// Publicly offered units are clamped so they never exceed what is held.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientQuantity` if fewer than `quantity` units are held.
    pub fn release(&mut self, quantity: u64) -> Result<(), DomainError> {
        if self.quantity < quantity {
            return Err(DomainError::InsufficientQuantity {
                what: "quantity".to_string(),
                held: self.quantity,
                requested: quantity,
            });
        }
        self.quantity -= quantity;
        self.public_count = self.public_count.min(self.quantity);
        Ok(())
    }

    /// Remove `quantity` publicly offered units, as an OTC transfer does.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientQuantity` if either the held or the offered count
    /// is below `quantity`.
    pub fn withdraw_offered(&mut self, quantity: u64) -> Result<(), DomainError> {
        if self.public_count < quantity {
            return Err(DomainError::InsufficientQuantity {
                what: "public_count".to_string(),
                held: self.public_count,
                requested: quantity,
            });
        }
        self.release(quantity)?;
        self.public_count = self.public_count.saturating_sub(quantity);
        Ok(())
    }

    /// Put back `quantity` offered units removed by [`Self::withdraw_offered`].
    pub const fn restore_offered(&mut self, quantity: u64) {
        self.quantity += quantity;
        self.public_count += quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(quantity: u64, public_count: u64) -> Position {
        Position {
            public_count,
            ..Position::open(UserId::new(1), SecurityId::new(2), quantity, Money::new(dec!(10)))
        }
    }

    #[test]
    fn acquire_weights_average_price() {
        let mut p = position(10, 0);
        p.acquire(10, Money::new(dec!(20)));
        assert_eq!(p.quantity, 20);
        assert_eq!(p.purchase_price, Money::new(dec!(15)));
    }

    #[test]
    fn release_to_zero_marks_empty() {
        let mut p = position(3, 0);
        p.release(3).unwrap();
        assert!(p.is_empty());
    }

    #[test]
    fn release_more_than_held_fails_without_mutation() {
        let mut p = position(2, 0);
        let err = p.release(5).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientQuantity { held: 2, requested: 5, .. }));
        assert_eq!(p.quantity, 2);
    }

    #[test]
    fn release_clamps_public_count() {
        let mut p = position(10, 8);
        p.release(5).unwrap();
        assert_eq!(p.public_count, 5);
    }

    #[test]
    fn withdraw_offered_requires_public_count() {
        let mut p = position(10, 2);
        let err = p.withdraw_offered(3).unwrap_err();
        assert!(err.to_string().contains("public_count"));
        assert_eq!((p.quantity, p.public_count), (10, 2));
    }

    #[test]
    fn withdraw_then_restore_round_trips() {
        let mut p = position(10, 6);
        p.withdraw_offered(4).unwrap();
        assert_eq!((p.quantity, p.public_count), (6, 2));
        p.restore_offered(4);
        assert_eq!((p.quantity, p.public_count), (10, 6));
    }
}
