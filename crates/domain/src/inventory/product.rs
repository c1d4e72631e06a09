//! Product rows and their stock classification.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use super::InventoryError;
use crate::Money;

/// Threshold used by low-stock listings when the caller does not supply one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Highest unit price accepted for a product: one billion in currency units.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

/// A product in the ledger. `stock` is the single source of truth for availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Classification of a product's stock relative to a low-stock threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockLevel {
    OutOfStock,
    Low,
    InStock,
}

/// Read-only availability snapshot returned by stock checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStatus {
    pub product_id: ProductId,
    pub stock: i64,
    pub available: bool,
}

impl Product {
    /// Classifies the current stock. A product with zero stock is out of stock
    /// regardless of the threshold.
    pub fn stock_level(&self, threshold: i64) -> StockLevel {
        if self.stock <= 0 {
            StockLevel::OutOfStock
        } else if self.stock < threshold {
            StockLevel::Low
        } else {
            StockLevel::InStock
        }
    }

    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.stock < threshold
    }

    pub fn availability(&self) -> StockStatus {
        StockStatus {
            product_id: self.id,
            stock: self.stock,
            available: self.stock > 0,
        }
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock: i64,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            description: None,
            price,
            stock,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.sku.trim().is_empty() {
            return Err(InventoryError::BlankField("sku"));
        }
        if self.name.trim().is_empty() {
            return Err(InventoryError::BlankField("name"));
        }
        check_price(self.price)?;
        if self.stock < 0 {
            return Err(InventoryError::InvalidStock { stock: self.stock });
        }
        Ok(())
    }

    /// Materializes the product row with a fresh id.
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            sku: self.sku,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            created_at: now,
            updated_at: now,
        }
    }
}

fn check_price(price: Money) -> Result<(), InventoryError> {
    if price.is_negative() || price.cents() > MAX_PRICE_CENTS {
        return Err(InventoryError::InvalidPrice {
            price: price.cents(),
        });
    }
    Ok(())
}

/// Partial update of a product. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i64>,
}

impl ProductUpdate {
    /// An update that only overrides the stock count.
    pub fn stock(stock: i64) -> Self {
        Self {
            stock: Some(stock),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(InventoryError::BlankField("name"));
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(stock) = self.stock
            && stock < 0
        {
            return Err(InventoryError::InvalidStock { stock });
        }
        Ok(())
    }

    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = Some(description.clone());
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        product.updated_at = now;
    }
}
