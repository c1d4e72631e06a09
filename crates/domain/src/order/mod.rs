//! Orders and the order status state machine.

mod model;
mod state;

pub use model::{MAX_IDEMPOTENCY_KEY_LEN, NewOrder, Order, OrderItem};
pub use state::OrderStatus;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The state diagram does not allow the requested move.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A status name that is not part of the lifecycle.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// The order total does not fit in `Money`.
    #[error("Order total is out of range")]
    TotalOverflow,

    /// The idempotency key is blank or too long.
    #[error("Idempotency key must be between 1 and 128 characters")]
    InvalidIdempotencyKey,
}
