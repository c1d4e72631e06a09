use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{
    NewOrder, NewProduct, Order, OrderStatus, Product, ProductUpdate, StockDelta, StockRequest,
};

use crate::Result;

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// The persisted order.
    pub order: Order,

    /// True when the idempotency key matched an earlier order and nothing
    /// was reserved by this call.
    pub replayed: bool,
}

impl Placement {
    pub fn fresh(order: Order) -> Self {
        Self {
            order,
            replayed: false,
        }
    }

    pub fn replayed(order: Order) -> Self {
        Self {
            order,
            replayed: true,
        }
    }
}

/// Core trait for ledger store implementations.
///
/// Every method is one atomic unit: it either applies completely or returns
/// an error and leaves the store exactly as it was. Stock never goes
/// negative, however many calls run concurrently. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new product. Fails with `DuplicateSku` if the SKU is taken.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    /// Retrieves a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves a product by SKU.
    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>>;

    /// Lists all products ordered by SKU.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Applies a partial update. A stock override must be non-negative.
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product>;

    /// Deletes a product. Fails with `ProductInUse` while any open order
    /// references it.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// Lists products whose stock is strictly below `threshold`, lowest first.
    async fn list_low_stock(&self, threshold: i64) -> Result<Vec<Product>>;

    /// Decrements stock for every request, or for none of them.
    ///
    /// Returns the touched products after the change, in request order.
    async fn reserve(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>>;

    /// Gives previously reserved quantities back to the ledger.
    ///
    /// Fails with `ProductsNotFound` if a product has been deleted since.
    async fn restock(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>>;

    /// Applies signed corrections as one batch. Any delta that would leave a
    /// product below zero rejects the batch.
    async fn adjust_stock(&self, deltas: Vec<StockDelta>) -> Result<Vec<Product>>;

    /// Reserves stock and persists the order with price snapshots in the same
    /// atomic unit.
    ///
    /// If the order carries an idempotency key already used by the same user,
    /// the earlier order is returned and nothing is reserved.
    async fn place_order(&self, order: NewOrder) -> Result<Placement>;

    /// Retrieves an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Checks that the backing store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Moves an order to `target` under a lock on the order row.
    ///
    /// Moving to `Canceled` restocks every item in the same atomic unit. A
    /// second cancellation observes the terminal status and fails with
    /// `InvalidTransition` without touching stock.
    async fn transition_order(&self, id: OrderId, target: OrderStatus) -> Result<Order>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Reserves a single product.
    async fn reserve_one(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut products = self
            .reserve(vec![StockRequest::new(product_id, quantity)])
            .await?;
        products
            .pop()
            .ok_or_else(|| crate::StoreError::product_not_found(product_id))
    }

    /// Applies a single signed correction.
    async fn adjust_one(&self, product_id: ProductId, delta: i64) -> Result<Product> {
        let mut products = self
            .adjust_stock(vec![StockDelta::new(product_id, delta)])
            .await?;
        products
            .pop()
            .ok_or_else(|| crate::StoreError::product_not_found(product_id))
    }

    /// Retrieves a product, failing with `NotFound` if absent.
    async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or_else(|| crate::StoreError::product_not_found(id))
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}
