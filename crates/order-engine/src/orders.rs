//! Order placement and lifecycle.

use std::time::Instant;

use common::{OrderId, UserId};
use domain::{NewOrder, Order, OrderStatus, StockRequest};
use ledger_store::LedgerStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::inventory::{record_reservation_failure, validate_requests};
use crate::notification::{NotificationEvent, Notifier};

/// Order operations on top of a [`LedgerStore`].
///
/// Placing an order reserves stock and writes the order in one atomic store
/// call. The order notification is enqueued only after that call has
/// committed, and its failure never fails the order.
pub struct OrderService<S: LedgerStore, N: Notifier> {
    store: S,
    notifier: N,
    config: EngineConfig,
}

impl<S: LedgerStore, N: Notifier> OrderService<S, N> {
    pub fn new(store: S, notifier: N, config: EngineConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Places an order for `user_id`.
    ///
    /// With an idempotency key, repeating the call returns the order created
    /// by the first call without reserving stock or notifying again.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        items: Vec<StockRequest>,
        idempotency_key: Option<String>,
    ) -> Result<Order> {
        let start = Instant::now();
        validate_requests(&items)?;

        let mut request = NewOrder::new(user_id, items);
        request.idempotency_key = idempotency_key;
        request.validate()?;

        let placement = match self
            .config
            .retry
            .run("place_order", || self.store.place_order(request.clone()))
            .await
        {
            Ok(placement) => placement,
            Err(err) => {
                let err = EngineError::from(err);
                record_reservation_failure(&err);
                tracing::info!(error = %err, "order rejected");
                return Err(err);
            }
        };

        let order = placement.order;
        if placement.replayed {
            tracing::info!(order_id = %order.id, "idempotent replay, returning existing order");
            return Ok(order);
        }

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_create_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            total = %order.total_amount(),
            units = order.unit_count(),
            "order created"
        );

        self.notify_created(&order).await;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| EngineError::order_not_found(id))
    }

    /// A user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_by_user(user_id).await?)
    }

    /// Moves an order along its lifecycle. `Canceled` releases the stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        if status == OrderStatus::Canceled {
            return self.cancel_order(id).await;
        }

        let order = self
            .config
            .retry
            .run("transition_order", || self.store.transition_order(id, status))
            .await?;
        tracing::info!(order_id = %id, status = %order.status, "order status updated");
        Ok(order)
    }

    /// Cancels an order and returns its items to stock in the same atomic
    /// unit. Canceling twice fails with `InvalidTransition` and restocks
    /// nothing.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let order = self
            .config
            .retry
            .run("cancel_order", || {
                self.store.transition_order(id, OrderStatus::Canceled)
            })
            .await?;

        metrics::counter!("orders_canceled_total").increment(1);
        tracing::info!(order_id = %id, units = order.unit_count(), "order canceled, stock released");
        Ok(order)
    }

    async fn notify_created(&self, order: &Order) {
        let event = NotificationEvent::order_created(order);
        let event_id = event.event_id();
        match self.notifier.enqueue(event).await {
            Ok(()) => {
                metrics::counter!("notifications_enqueued_total").increment(1);
                tracing::debug!(order_id = %order.id, %event_id, "order notification enqueued");
            }
            Err(err) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(order_id = %order.id, error = %err, "failed to enqueue order notification");
            }
        }
    }
}
