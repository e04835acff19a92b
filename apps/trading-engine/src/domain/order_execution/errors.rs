//! Order execution errors.

use thiserror::Error;

use super::value_objects::OrderStatus;
use crate::domain::shared::OrderId;

/// Errors raised by the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Invalid status transition attempted.
    #[error("order {order_id}: cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// Order being changed.
        order_id: OrderId,
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
    },

    /// Fill quantity exceeds remaining quantity.
    #[error("order {order_id}: fill of {fill_qty} exceeds remaining {remaining_qty}")]
    FillExceedsRemaining {
        /// Order being filled.
        order_id: OrderId,
        /// Fill quantity attempted.
        fill_qty: u64,
        /// Remaining quantity.
        remaining_qty: u64,
    },

    /// Order cannot receive fills in its current status.
    #[error("order {order_id}: cannot fill while {status}")]
    CannotFill {
        /// Order being filled.
        order_id: OrderId,
        /// Current status.
        status: OrderStatus,
    },

    /// Invalid order parameters.
    #[error("invalid order parameter '{field}': {message}")]
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_error_display() {
        let err = OrderError::InvalidStateTransition {
            order_id: OrderId::new(3),
            from: OrderStatus::Done,
            to: OrderStatus::Cancelled,
        };
        let msg = err.to_string();
        assert!(msg.contains("order 3"));
        assert!(msg.contains("done"));
        assert!(msg.contains("cancelled"));
    }

    #[test]
    fn fill_exceeds_display() {
        let err = OrderError::FillExceedsRemaining {
            order_id: OrderId::new(1),
            fill_qty: 4,
            remaining_qty: 2,
        };
        assert!(err.to_string().contains("exceeds remaining 2"));
    }
}
