//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Order, OrderStatus, StockRequest};
use ledger_store::LedgerStore;
use order_engine::Notifier;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id, positive_quantity};
use crate::error::ApiError;

/// Header carrying the client's idempotency key for order creation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<OrderItemRequest>,
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status,
            total_cents: order.total_amount().cents(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    total_cents: item.total_price().cents(),
                })
                .collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// POST /orders: reserve stock and place an order.
///
/// The idempotency key may come from the body or the `Idempotency-Key`
/// header; the body wins when both are present.
#[tracing::instrument(skip(state, headers, req), fields(lines = req.items.len()))]
pub async fn create<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id: UserId = parse_id("user_id", &req.user_id)?;
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }
    let items = req
        .items
        .iter()
        .map(|item| {
            Ok(StockRequest::new(
                parse_id("product_id", &item.product_id)?,
                positive_quantity(item.quantity)?,
            ))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let idempotency_key = match req.idempotency_key {
        Some(key) => Some(key),
        None => headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .map(str::to_string)
                    .map_err(|_| ApiError::BadRequest("Invalid Idempotency-Key header".to_string()))
            })
            .transpose()?,
    };

    let order = state
        .orders
        .create_order(user_id, items, idempotency_key)
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id("order id", &id)?;
    let order = state.orders.get_order(id).await?;
    Ok(Json(order.into()))
}

/// GET /users/{user_id}/orders: newest first.
#[tracing::instrument(skip(state))]
pub async fn list_by_user<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id: UserId = parse_id("user_id", &user_id)?;
    let orders = state.orders.list_orders_by_user(user_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id("order id", &id)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: domain::OrderError| ApiError::BadRequest(e.to_string()))?;

    let order = state.orders.update_status(id, status).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: LedgerStore + 'static, N: Notifier + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id("order id", &id)?;
    let order = state.orders.cancel_order(id).await?;
    Ok(Json(order.into()))
}
