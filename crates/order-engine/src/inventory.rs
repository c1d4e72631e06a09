//! Product catalog and stock ledger operations.

use common::ProductId;
use domain::{
    NewProduct, Product, ProductUpdate, StockDelta, StockRequest, StockStatus,
};
use ledger_store::{LedgerStore, LedgerStoreExt};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Inventory operations on top of a [`LedgerStore`].
///
/// Inputs are re-checked here even when a transport layer has already
/// validated them; every stock mutation runs as one atomic store call,
/// retried on transient conflicts.
pub struct InventoryService<S: LedgerStore> {
    store: S,
    config: EngineConfig,
}

impl<S: LedgerStore> InventoryService<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[tracing::instrument(skip(self, product), fields(sku = %product.sku))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let product = self
            .config
            .retry
            .run("create_product", || self.store.create_product(product.clone()))
            .await?;
        tracing::info!(product_id = %product.id, stock = product.stock, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        Ok(self.store.require_product(id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product_by_sku(&self, sku: &str) -> Result<Product> {
        self.store
            .get_product_by_sku(sku)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Product",
                id: sku.to_string(),
            })
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.store.list_products().await?)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;
        if update.is_empty() {
            return self.get_product(id).await;
        }
        Ok(self
            .config
            .retry
            .run("update_product", || self.store.update_product(id, update.clone()))
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.config
            .retry
            .run("delete_product", || self.store.delete_product(id))
            .await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Adds a signed `delta` to a product's stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        Ok(self
            .config
            .retry
            .run("adjust_stock", || self.store.adjust_one(id, delta))
            .await?)
    }

    /// Administrative override of a product's stock.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, id: ProductId, stock: i64) -> Result<Product> {
        self.update_product(id, ProductUpdate::stock(stock)).await
    }

    /// Removes `quantity` units outside of any order (damage, shrinkage).
    #[tracing::instrument(skip(self))]
    pub async fn reduce_stock(&self, id: ProductId, quantity: i64) -> Result<Product> {
        if quantity <= 0 {
            return Err(EngineError::Validation(format!(
                "quantity must be greater than 0, got {quantity}"
            )));
        }
        self.update_stock(id, -quantity).await
    }

    /// Reserves `quantity` units of a single product.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        validate_requests(&[StockRequest::new(id, quantity)])?;
        let result = self
            .config
            .retry
            .run("reserve", || self.store.reserve_one(id, quantity))
            .await
            .map_err(EngineError::from);

        if let Err(err) = &result {
            record_reservation_failure(err);
        }
        result
    }

    /// Decrements stock for every request or for none of them.
    #[tracing::instrument(skip(self, requests), fields(lines = requests.len()))]
    pub async fn reserve(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        validate_requests(&requests)?;
        let result = self
            .config
            .retry
            .run("reserve", || self.store.reserve(requests.clone()))
            .await
            .map_err(EngineError::from);

        if let Err(err) = &result {
            record_reservation_failure(err);
        }
        result
    }

    /// Gives reserved quantities back.
    #[tracing::instrument(skip(self, requests), fields(lines = requests.len()))]
    pub async fn restock(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        validate_requests(&requests)?;
        Ok(self
            .config
            .retry
            .run("restock", || self.store.restock(requests.clone()))
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn check_stock(&self, id: ProductId) -> Result<StockStatus> {
        Ok(self.get_product(id).await?.availability())
    }

    /// Products with stock strictly below `threshold`, or the configured
    /// default when none is given.
    #[tracing::instrument(skip(self))]
    pub async fn list_low_stock(&self, threshold: Option<i64>) -> Result<Vec<Product>> {
        let threshold = threshold.unwrap_or(self.config.low_stock_threshold);
        Ok(self.store.list_low_stock(threshold).await?)
    }

    /// Applies every delta as one batch; any delta that would drive a
    /// product below zero rejects the whole batch.
    #[tracing::instrument(skip(self, deltas), fields(lines = deltas.len()))]
    pub async fn bulk_update_stock(&self, deltas: Vec<StockDelta>) -> Result<Vec<Product>> {
        let products = self.adjust(deltas).await?;
        tracing::info!(products = products.len(), "bulk stock update applied");
        Ok(products)
    }

    async fn adjust(&self, deltas: Vec<StockDelta>) -> Result<Vec<Product>> {
        if deltas.is_empty() {
            return Err(EngineError::Validation("stock update list is empty".to_string()));
        }
        Ok(self
            .config
            .retry
            .run("adjust_stock", || self.store.adjust_stock(deltas.clone()))
            .await?)
    }
}

pub(crate) fn validate_requests(requests: &[StockRequest]) -> Result<()> {
    if requests.is_empty() {
        return Err(EngineError::Validation("item list is empty".to_string()));
    }
    if let Some(bad) = requests.iter().find(|r| r.quantity == 0) {
        return Err(EngineError::Validation(format!(
            "quantity for product {} must be greater than 0",
            bad.product_id
        )));
    }
    Ok(())
}

pub(crate) fn record_reservation_failure(err: &EngineError) {
    metrics::counter!("stock_reservation_failures_total", "reason" => err.kind()).increment(1);
}
