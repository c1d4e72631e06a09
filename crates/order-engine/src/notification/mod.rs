//! Order notifications.
//!
//! The order service hands a [`NotificationEvent`] to a [`Notifier`] after the
//! order transaction has committed. Delivery is at-least-once: consumers must
//! tolerate seeing the same `event_id` twice, which [`NotificationWorker`]
//! does by remembering recently delivered ids.

mod queue;
mod sink;

pub use queue::{Delivery, NotificationWorker, QueueNotifier};
pub use sink::{LogSink, NotificationSink};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Money, Order};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Topic every order notification is published on.
pub const NOTIFICATION_TOPIC: &str = "notification";

/// Errors raised while enqueuing or delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification queue is closed")]
    QueueClosed,

    /// The backend refused the message.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// One line of an order as carried in a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Payload describing a freshly placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    /// Unique per emitted event; the de-duplication key for consumers.
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<NotifiedItem>,
    pub total: Money,
    pub occurred_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id: order.id,
            user_id: order.user_id,
            items: order
                .items
                .iter()
                .map(|item| NotifiedItem {
                    product_id: item.product_id,
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            total: order.total_amount(),
            occurred_at: order.created_at,
        }
    }
}

/// Messages published by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    OrderCreated(OrderCreatedEvent),
}

impl NotificationEvent {
    pub fn order_created(order: &Order) -> Self {
        NotificationEvent::OrderCreated(OrderCreatedEvent::from_order(order))
    }

    pub fn topic(&self) -> &'static str {
        NOTIFICATION_TOPIC
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::OrderCreated(_) => "ORDER_CREATED",
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            NotificationEvent::OrderCreated(e) => e.event_id,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            NotificationEvent::OrderCreated(e) => e.order_id,
        }
    }
}

/// Fire-and-forget publication of notifications.
///
/// `enqueue` must not wait on the delivery backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn enqueue(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn enqueue(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        (**self).enqueue(event).await
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    events: Vec<NotificationEvent>,
    fail_on_enqueue: bool,
}

/// Records notifications in memory, for testing.
///
/// Also usable as a [`NotificationSink`] behind a [`NotificationWorker`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following enqueue fail with `NotifyError::Rejected`.
    pub async fn set_fail_on_enqueue(&self, fail: bool) {
        self.state.lock().await.fail_on_enqueue = fail;
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn enqueue(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        if state.fail_on_enqueue {
            return Err(NotifyError::Rejected("notifier configured to fail".to_string()));
        }
        state.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotifier {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.enqueue(event.clone()).await
    }
}
