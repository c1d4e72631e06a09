//! Engine error types.

use common::ProductId;
use domain::{DomainError, InventoryError, OrderError, OrderStatus};
use ledger_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the inventory and order services.
///
/// Every error means the operation left the ledger untouched. Only
/// `TransactionConflict` and `DependencyUnavailable` are worth retrying.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The product or order does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The input failed a sanity check.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// One or more referenced products do not exist.
    #[error("Products not found: {}", format_ids(.0))]
    ProductsNotFound(Vec<ProductId>),

    /// Not enough stock to satisfy the request.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// The order lifecycle does not allow the requested move.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Another product already uses this SKU.
    #[error("A product with SKU {0} already exists")]
    DuplicateSku(String),

    /// The product is still referenced by an open order.
    #[error("Product {0} is referenced by an open order")]
    ProductInUse(ProductId),

    /// Contention did not clear within the retry budget.
    #[error("Transaction conflict, try again: {0}")]
    TransactionConflict(String),

    /// The database or another collaborator could not be reached.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn product_not_found(id: ProductId) -> Self {
        Self::NotFound {
            entity: "Product",
            id: id.to_string(),
        }
    }

    pub fn order_not_found(id: common::OrderId) -> Self {
        Self::NotFound {
            entity: "Order",
            id: id.to_string(),
        }
    }

    /// Short machine-friendly label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Validation(_) => "validation",
            EngineError::ProductsNotFound(_) => "products_not_found",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::DuplicateSku(_) => "duplicate_sku",
            EngineError::ProductInUse(_) => "product_in_use",
            EngineError::TransactionConflict(_) => "transaction_conflict",
            EngineError::DependencyUnavailable(_) => "dependency_unavailable",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<InventoryError> for EngineError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductsNotFound(ids) => EngineError::ProductsNotFound(ids),
            InventoryError::InsufficientStock {
                product_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => {
                EngineError::InvalidTransition { from, to }
            }
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Inventory(e) => e.into(),
            DomainError::Order(e) => e.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::DuplicateSku(sku) => EngineError::DuplicateSku(sku),
            StoreError::ProductInUse(id) => EngineError::ProductInUse(id),
            StoreError::Inventory(e) => e.into(),
            StoreError::Order(e) => e.into(),
            StoreError::Conflict(msg) => EngineError::TransactionConflict(msg),
            StoreError::Unavailable(msg) => EngineError::DependencyUnavailable(msg),
            err @ (StoreError::Corrupt(_)
            | StoreError::Database(_)
            | StoreError::Migration(_)) => EngineError::Internal(err.to_string()),
        }
    }
}

fn format_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_outcomes_keep_their_details() {
        let product_id = ProductId::new();
        let err: EngineError = StoreError::Inventory(InventoryError::InsufficientStock {
            product_id,
            available: 2,
            requested: 5,
        })
        .into();

        assert!(matches!(
            err,
            EngineError::InsufficientStock { available: 2, requested: 5, .. }
        ));
        assert_eq!(err.kind(), "insufficient_stock");
    }

    #[test]
    fn test_rule_violations_become_validation() {
        let err: EngineError = InventoryError::InvalidQuantity { quantity: 0 }.into();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("greater than 0")));

        let err: EngineError = DomainError::from(OrderError::NoItems).into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_store_faults_map_to_retry_classes() {
        let conflict: EngineError = StoreError::Conflict("lock timeout".into()).into();
        assert!(matches!(conflict, EngineError::TransactionConflict(_)));

        let down: EngineError = StoreError::Unavailable("pool timed out".into()).into();
        assert!(matches!(down, EngineError::DependencyUnavailable(_)));

        let corrupt: EngineError = StoreError::Corrupt("order status X".into()).into();
        assert!(matches!(corrupt, EngineError::Internal(msg) if msg.contains("order status X")));
    }

    #[test]
    fn test_products_not_found_message_lists_ids() {
        let id = ProductId::new();
        let err = EngineError::ProductsNotFound(vec![id]);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
