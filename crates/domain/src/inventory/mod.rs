//! Products and the stock ledger rules shared by every storage adapter.

mod ledger;
mod product;

pub use ledger::{
    StockChange, StockDelta, StockRequest, consolidate_deltas, consolidate_requests,
    plan_adjustment, plan_reservation, plan_restock,
};
pub use product::{
    DEFAULT_LOW_STOCK_THRESHOLD, MAX_PRICE_CENTS, NewProduct, Product, ProductUpdate, StockLevel, StockStatus,
};

use common::ProductId;
use thiserror::Error;

/// Errors raised by stock ledger rules.
///
/// Every variant describes a business outcome, not a system fault: the
/// operation that produced it changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// One or more requested products do not exist.
    #[error("Products not found: {}", format_ids(.0))]
    ProductsNotFound(Vec<ProductId>),

    /// Applying the request would drive stock below zero.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// A reservation or restock quantity was zero or negative.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Combined quantities for one product do not fit the ledger's range.
    #[error("Quantity for product {product_id} is out of range")]
    QuantityOverflow { product_id: ProductId },

    /// An absolute stock value was negative.
    #[error("Invalid stock: {stock} (must not be negative)")]
    InvalidStock { stock: i64 },

    /// A price was negative or above `MAX_PRICE_CENTS`.
    #[error("Invalid price: {price} (must be between 0 and 100000000000 cents)")]
    InvalidPrice { price: i64 },

    /// A required text field was blank.
    #[error("Field '{0}' must not be empty")]
    BlankField(&'static str),

    /// The request carried no items.
    #[error("Stock request is empty")]
    EmptyRequest,
}

fn format_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
