//! HTTP handlers.

pub mod orders;
pub mod products;
pub mod system;

use std::str::FromStr;

use ledger_store::LedgerStore;
use order_engine::{InventoryService, Notifier, OrderService};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore, N: Notifier> {
    pub inventory: InventoryService<S>,
    pub orders: OrderService<S, N>,
}

/// Parses a UUID-backed id from a path segment or body field.
pub(crate) fn parse_id<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

/// Checks that a quantity is positive and fits the ledger's unit type.
pub(crate) fn positive_quantity(quantity: i64) -> Result<u32, ApiError> {
    if quantity <= 0 {
        return Err(ApiError::BadRequest(format!(
            "quantity must be greater than 0, got {quantity}"
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| ApiError::BadRequest(format!("quantity {quantity} is too large")))
}
