//! Domain error types.

use thiserror::Error;

use crate::inventory::InventoryError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A stock ledger rule was violated.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}
