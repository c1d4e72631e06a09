use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::inventory::{plan_adjustment, plan_reservation, plan_restock};
use domain::{
    NewOrder, NewProduct, Order, OrderStatus, Product, ProductUpdate, StockChange, StockDelta,
    StockRequest,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{LedgerStore, Placement},
};

#[derive(Debug)]
struct StoredOrder {
    /// Insertion sequence, breaks ties between equal `created_at` values.
    seq: u64,
    idempotency_key: Option<String>,
    order: Order,
}

#[derive(Debug, Default)]
struct LedgerState {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, StoredOrder>,
    next_seq: u64,
    pending_conflicts: u32,
}

impl LedgerState {
    fn take_injected_conflict(&mut self) -> Result<()> {
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }
        Ok(())
    }

    fn products_for(&self, ids: impl IntoIterator<Item = ProductId>) -> Vec<Product> {
        ids.into_iter()
            .filter_map(|id| self.products.get(&id).cloned())
            .collect()
    }

    fn commit(&mut self, changes: &[StockChange], now: DateTime<Utc>) -> Vec<Product> {
        changes
            .iter()
            .filter_map(|change| {
                let product = self.products.get_mut(&change.product_id)?;
                product.stock = change.current;
                product.updated_at = now;
                Some(product.clone())
            })
            .collect()
    }

    fn find_by_idempotency_key(&self, user_id: UserId, key: &str) -> Option<&Order> {
        self.orders
            .values()
            .find(|stored| {
                stored.order.user_id == user_id && stored.idempotency_key.as_deref() == Some(key)
            })
            .map(|stored| &stored.order)
    }
}

/// In-memory ledger store implementation for testing and single-process use.
///
/// Every mutating call holds the write lock for its whole duration, so calls
/// are serialized and each one is trivially atomic.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` mutating calls fail with `StoreError::Conflict`
    /// before they touch any state.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.write().await.pending_conflicts = count;
    }

    /// Returns the number of stored products.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::DuplicateSku(product.sku));
        }

        let product = product.into_product(Utc::now());
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.values().find(|p| p.sku == sku).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;

        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::product_not_found(id))?;
        update.apply_to(product, Utc::now());
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        if !state.products.contains_key(&id) {
            return Err(StoreError::product_not_found(id));
        }

        let referenced_by_open_order = state.orders.values().any(|stored| {
            stored.order.status.is_open()
                && stored.order.items.iter().any(|item| item.product_id == id)
        });
        if referenced_by_open_order {
            return Err(StoreError::ProductInUse(id));
        }

        state.products.remove(&id);
        Ok(())
    }

    async fn list_low_stock(&self, threshold: i64) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| p.is_low_stock(threshold))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.sku.cmp(&b.sku)));
        Ok(products)
    }

    async fn reserve(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        let products = state.products_for(requests.iter().map(|r| r.product_id));
        let changes = plan_reservation(&products, &requests)?;
        Ok(state.commit(&changes, Utc::now()))
    }

    async fn restock(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        let products = state.products_for(requests.iter().map(|r| r.product_id));
        let changes = plan_restock(&products, &requests)?;
        Ok(state.commit(&changes, Utc::now()))
    }

    async fn adjust_stock(&self, deltas: Vec<StockDelta>) -> Result<Vec<Product>> {
        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        let products = state.products_for(deltas.iter().map(|d| d.product_id));
        let changes = plan_adjustment(&products, &deltas)?;
        Ok(state.commit(&changes, Utc::now()))
    }

    async fn place_order(&self, order: NewOrder) -> Result<Placement> {
        order.validate()?;

        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        if let Some(key) = order.idempotency_key.as_deref()
            && let Some(existing) = state.find_by_idempotency_key(order.user_id, key)
        {
            return Ok(Placement::replayed(existing.clone()));
        }

        let products = state.products_for(order.items.iter().map(|r| r.product_id));
        let changes = plan_reservation(&products, &order.items)?;

        let now = Utc::now();
        let idempotency_key = order.idempotency_key.clone();
        let placed = order.into_order(OrderId::new(), &products, now)?;

        state.commit(&changes, now);
        state.next_seq += 1;
        let seq = state.next_seq;
        state.orders.insert(
            placed.id,
            StoredOrder {
                seq,
                idempotency_key,
                order: placed.clone(),
            },
        );

        Ok(Placement::fresh(placed))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).map(|stored| stored.order.clone()))
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<&StoredOrder> = state
            .orders
            .values()
            .filter(|stored| stored.order.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(orders.into_iter().map(|s| s.order.clone()).collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn transition_order(&self, id: OrderId, target: OrderStatus) -> Result<Order> {
        let mut state = self.state.write().await;
        state.take_injected_conflict()?;

        let order = state
            .orders
            .get(&id)
            .map(|stored| stored.order.clone())
            .ok_or_else(|| StoreError::order_not_found(id))?;
        let status = order.status.transition_to(target)?;

        let now = Utc::now();
        if status == OrderStatus::Canceled {
            let requests = order.restock_requests();
            let products = state.products_for(requests.iter().map(|r| r.product_id));
            let changes = plan_restock(&products, &requests)?;
            state.commit(&changes, now);
        }

        let stored = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;
        stored.order.status = status;
        stored.order.updated_at = now;
        Ok(stored.order.clone())
    }
}
