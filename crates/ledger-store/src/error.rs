use common::ProductId;
use domain::{DomainError, InventoryError, OrderError};
use thiserror::Error;

/// Errors that can occur when interacting with the ledger store.
///
/// Any error returned from a mutating call means the call was rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested product or order does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another product already uses this SKU.
    #[error("A product with SKU {0} already exists")]
    DuplicateSku(String),

    /// The product is referenced by an order that is still open.
    #[error("Product {0} is referenced by an open order")]
    ProductInUse(ProductId),

    /// A stock ledger rule rejected the change.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// An order rule rejected the change.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The transaction lost a race (serialization failure, deadlock, lock
    /// timeout). Safe to retry.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// The database could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back into the domain.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
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

    /// Returns true if re-running the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Inventory(e) => StoreError::Inventory(e),
            DomainError::Order(e) => StoreError::Order(e),
        }
    }
}

/// SQLSTATE codes that signal a lost race rather than a broken request.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                    StoreError::Conflict(db_err.message().to_string())
                }
                _ => StoreError::Database(err),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
