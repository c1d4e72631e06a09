//! Transactional storage for the product ledger and orders.
//!
//! [`LedgerStore`] is the port the order engine talks to. Two adapters ship
//! with the crate: [`PostgresLedgerStore`] for production and
//! [`InMemoryLedgerStore`] for tests and local runs without a database.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryLedgerStore;
pub use postgres::{DEFAULT_LOCK_TIMEOUT, PostgresLedgerStore};
pub use store::{LedgerStore, LedgerStoreExt, Placement};
