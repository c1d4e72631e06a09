//! Product catalog and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{Money, NewProduct, Product, ProductUpdate, StockDelta, StockLevel, StockStatus};
use ledger_store::LedgerStore;
use order_engine::Notifier;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id, positive_quantity};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<i64>,
}

#[derive(Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub updates: Vec<BulkUpdateItem>,
}

#[derive(Deserialize)]
pub struct BulkUpdateItem {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub stock: i64,
    pub stock_level: StockLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductResponse {
    fn new(product: Product, low_stock_threshold: i64) -> Self {
        Self {
            id: product.id.to_string(),
            stock_level: product.stock_level(low_stock_threshold),
            sku: product.sku,
            name: product.name,
            description: product.description,
            price_cents: product.price.cents(),
            stock: product.stock,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct StockStatusResponse {
    pub product_id: String,
    pub stock: i64,
    pub available: bool,
}

impl From<StockStatus> for StockStatusResponse {
    fn from(status: StockStatus) -> Self {
        Self {
            product_id: status.product_id.to_string(),
            stock: status.stock,
            available: status.available,
        }
    }
}

fn respond<S: LedgerStore, N: Notifier>(
    state: &AppState<S, N>,
    product: Product,
) -> ProductResponse {
    ProductResponse::new(product, state.inventory.config().low_stock_threshold)
}

fn respond_all<S: LedgerStore, N: Notifier>(
    state: &AppState<S, N>,
    products: Vec<Product>,
) -> Vec<ProductResponse> {
    products.into_iter().map(|p| respond(state, p)).collect()
}

// -- Handlers --

/// POST /products: create a product.
#[tracing::instrument(skip(state, req), fields(sku = %req.sku))]
pub async fn create<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let mut product = NewProduct::new(req.sku, req.name, Money::from_cents(req.price_cents), req.stock);
    product.description = req.description;

    let product = state.inventory.create_product(product).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, product))))
}

/// GET /products: list all products.
pub async fn list<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.inventory.list_products().await?;
    Ok(Json(respond_all(&state, products)))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let product = state.inventory.get_product(id).await?;
    Ok(Json(respond(&state, product)))
}

/// PUT /products/{id}: partial update; absent fields stay unchanged.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let update = ProductUpdate {
        name: req.name,
        description: req.description,
        price: req.price_cents.map(Money::from_cents),
        stock: req.stock,
    };
    let product = state.inventory.update_product(id, update).await?;
    Ok(Json(respond(&state, product)))
}

/// DELETE /products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    state.inventory.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/low-stock?threshold=N
#[tracing::instrument(skip(state, query), fields(threshold = ?query.threshold))]
pub async fn low_stock<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    if let Some(threshold) = query.threshold
        && threshold < 0
    {
        return Err(ApiError::BadRequest(format!(
            "threshold must not be negative, got {threshold}"
        )));
    }
    let products = state.inventory.list_low_stock(query.threshold).await?;
    Ok(Json(respond_all(&state, products)))
}

/// PATCH /products/stock/bulk-update: apply signed deltas as one batch.
#[tracing::instrument(skip(state, req), fields(updates = req.updates.len()))]
pub async fn bulk_update<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<BulkUpdateRequest>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    if req.updates.is_empty() {
        return Err(ApiError::BadRequest("updates must not be empty".to_string()));
    }
    let deltas = req
        .updates
        .iter()
        .map(|u| Ok(StockDelta::new(parse_id("product_id", &u.product_id)?, u.quantity)))
        .collect::<Result<Vec<_>, ApiError>>()?;

    let products = state.inventory.bulk_update_stock(deltas).await?;
    Ok(Json(respond_all(&state, products)))
}

/// PATCH /products/{id}/stock: add a signed delta.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn update_stock<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let product = state.inventory.update_stock(id, req.quantity).await?;
    Ok(Json(respond(&state, product)))
}

/// PATCH /products/{id}/stock/reduce
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn reduce_stock<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let quantity = positive_quantity(req.quantity)?;
    let product = state.inventory.reduce_stock(id, i64::from(quantity)).await?;
    Ok(Json(respond(&state, product)))
}

/// GET /products/{id}/stock
#[tracing::instrument(skip(state))]
pub async fn check_stock<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<StockStatusResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let status = state.inventory.check_stock(id).await?;
    Ok(Json(status.into()))
}

/// POST /products/{id}/reserve
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn reserve<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let quantity = positive_quantity(req.quantity)?;
    let product = state.inventory.reserve_stock(id, quantity).await?;
    Ok(Json(respond(&state, product)))
}
