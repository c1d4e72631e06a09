//! Domain layer for the inventory ledger and order engine.
//!
//! This crate is free of I/O. It provides:
//! - `Product` rows and their stock classification
//! - all-or-nothing planning of reservations, restocks and bulk adjustments
//! - `Order` with price-snapshotted items and the `OrderStatus` state machine

pub mod error;
pub mod inventory;
mod money;
pub mod order;

pub use error::DomainError;
pub use inventory::{
    DEFAULT_LOW_STOCK_THRESHOLD, InventoryError, MAX_PRICE_CENTS, NewProduct, Product, ProductUpdate, StockChange,
    StockDelta, StockLevel, StockRequest, StockStatus,
};
pub use money::Money;
pub use order::{NewOrder, Order, OrderError, OrderItem, OrderStatus};
