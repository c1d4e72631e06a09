//! All-or-nothing planning of stock mutations.
//!
//! Storage adapters load (and lock) the affected product rows, ask one of the
//! `plan_*` functions for the resulting stock values and write them only if
//! planning succeeded. A failed plan means no row is touched.

use std::collections::HashMap;

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::{InventoryError, Product};

/// A request to take (or give back) `quantity` units of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A signed administrative stock correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: ProductId,
    pub delta: i64,
}

impl StockDelta {
    pub fn new(product_id: ProductId, delta: i64) -> Self {
        Self { product_id, delta }
    }
}

/// The outcome of planning for a single product row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub previous: i64,
    pub current: i64,
}

/// Merges requests for the same product, keeping first-appearance order.
///
/// Fails with `QuantityOverflow` when the combined quantity of one product
/// does not fit in a `u32`.
pub fn consolidate_requests(
    requests: &[StockRequest],
) -> Result<Vec<StockRequest>, InventoryError> {
    let mut merged: Vec<StockRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        match merged
            .iter_mut()
            .find(|m| m.product_id == request.product_id)
        {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(request.quantity)
                    .ok_or(InventoryError::QuantityOverflow {
                        product_id: request.product_id,
                    })?;
            }
            None => merged.push(*request),
        }
    }
    Ok(merged)
}

/// Merges deltas for the same product, keeping first-appearance order.
pub fn consolidate_deltas(deltas: &[StockDelta]) -> Result<Vec<StockDelta>, InventoryError> {
    let mut merged: Vec<StockDelta> = Vec::with_capacity(deltas.len());
    for delta in deltas {
        match merged.iter_mut().find(|m| m.product_id == delta.product_id) {
            Some(existing) => {
                existing.delta = existing.delta.checked_add(delta.delta).ok_or(
                    InventoryError::QuantityOverflow {
                        product_id: delta.product_id,
                    },
                )?;
            }
            None => merged.push(*delta),
        }
    }
    Ok(merged)
}

/// Plans a reservation: every product must exist and hold enough stock.
pub fn plan_reservation(
    products: &[Product],
    requests: &[StockRequest],
) -> Result<Vec<StockChange>, InventoryError> {
    let requests = validated_requests(requests)?;
    let index = index_products(products, requests.iter().map(|r| r.product_id))?;

    requests
        .iter()
        .map(|request| {
            let product = index[&request.product_id];
            let requested = i64::from(request.quantity);
            if product.stock < requested {
                return Err(InventoryError::InsufficientStock {
                    product_id: product.id,
                    available: product.stock,
                    requested,
                });
            }
            Ok(StockChange {
                product_id: product.id,
                previous: product.stock,
                current: product.stock - requested,
            })
        })
        .collect()
}

/// Plans the compensating restock of previously reserved quantities.
pub fn plan_restock(
    products: &[Product],
    requests: &[StockRequest],
) -> Result<Vec<StockChange>, InventoryError> {
    let requests = validated_requests(requests)?;
    let index = index_products(products, requests.iter().map(|r| r.product_id))?;

    requests
        .iter()
        .map(|request| {
            let product = index[&request.product_id];
            let current = product
                .stock
                .checked_add(i64::from(request.quantity))
                .ok_or(InventoryError::QuantityOverflow {
                    product_id: product.id,
                })?;
            Ok(StockChange {
                product_id: product.id,
                previous: product.stock,
                current,
            })
        })
        .collect()
}

/// Plans a batch of signed corrections. Any delta that would leave a product
/// below zero rejects the whole batch.
pub fn plan_adjustment(
    products: &[Product],
    deltas: &[StockDelta],
) -> Result<Vec<StockChange>, InventoryError> {
    if deltas.is_empty() {
        return Err(InventoryError::EmptyRequest);
    }
    let deltas = consolidate_deltas(deltas)?;
    let index = index_products(products, deltas.iter().map(|d| d.product_id))?;

    deltas
        .iter()
        .map(|delta| {
            let product = index[&delta.product_id];
            let current = product.stock.checked_add(delta.delta).ok_or(
                InventoryError::QuantityOverflow {
                    product_id: product.id,
                },
            )?;
            if current < 0 {
                return Err(InventoryError::InsufficientStock {
                    product_id: product.id,
                    available: product.stock,
                    requested: delta.delta.saturating_neg(),
                });
            }
            Ok(StockChange {
                product_id: product.id,
                previous: product.stock,
                current,
            })
        })
        .collect()
}

fn validated_requests(requests: &[StockRequest]) -> Result<Vec<StockRequest>, InventoryError> {
    if requests.is_empty() {
        return Err(InventoryError::EmptyRequest);
    }
    if let Some(bad) = requests.iter().find(|r| r.quantity == 0) {
        return Err(InventoryError::InvalidQuantity {
            quantity: i64::from(bad.quantity),
        });
    }
    consolidate_requests(requests)
}

fn index_products(
    products: &[Product],
    wanted: impl Iterator<Item = ProductId>,
) -> Result<HashMap<ProductId, &Product>, InventoryError> {
    let index: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let mut missing: Vec<ProductId> = Vec::new();
    for id in wanted {
        if !index.contains_key(&id) && !missing.contains(&id) {
            missing.push(id);
        }
    }

    if missing.is_empty() {
        Ok(index)
    } else {
        Err(InventoryError::ProductsNotFound(missing))
    }
}
