//! Inventory ledger and order transaction engine.
//!
//! [`InventoryService`] owns the product catalog and every stock mutation;
//! [`OrderService`] places orders, moves them through their lifecycle and
//! releases stock on cancellation. Both run each mutation as a single atomic
//! [`ledger_store::LedgerStore`] call and retry it on transient conflicts
//! according to a [`RetryPolicy`].
//!
//! Order creation publishes an `ORDER_CREATED` notification after commit
//! through a [`Notifier`]; [`QueueNotifier`] and [`NotificationWorker`]
//! provide an in-process queue with at-least-once delivery.

pub mod config;
pub mod error;
pub mod inventory;
pub mod notification;
pub mod orders;
pub mod retry;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use inventory::InventoryService;
pub use notification::{
    Delivery, InMemoryNotifier, LogSink, NotificationEvent, NotificationSink,
    NotificationWorker, Notifier, NotifyError, OrderCreatedEvent, QueueNotifier,
};
pub use orders::OrderService;
pub use retry::RetryPolicy;
