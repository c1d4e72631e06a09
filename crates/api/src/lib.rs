//! HTTP API for the inventory ledger and order engine.
//!
//! Provides REST endpoints for the product catalog, stock operations and
//! orders, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use ledger_store::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use order_engine::{
    EngineConfig, InventoryService, LogSink, NotificationWorker, Notifier, OrderService,
    QueueNotifier,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle) -> Router
where
    S: LedgerStore + 'static,
    N: Notifier + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S, N>))
        .route(
            "/products",
            post(routes::products::create::<S, N>).get(routes::products::list::<S, N>),
        )
        .route("/products/low-stock", get(routes::products::low_stock::<S, N>))
        .route(
            "/products/stock/bulk-update",
            patch(routes::products::bulk_update::<S, N>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S, N>)
                .put(routes::products::update::<S, N>)
                .delete(routes::products::delete::<S, N>),
        )
        .route(
            "/products/{id}/stock",
            get(routes::products::check_stock::<S, N>)
                .patch(routes::products::update_stock::<S, N>),
        )
        .route(
            "/products/{id}/stock/reduce",
            patch(routes::products::reduce_stock::<S, N>),
        )
        .route("/products/{id}/reserve", post(routes::products::reserve::<S, N>))
        .route("/orders", post(routes::orders::create::<S, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, N>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S, N>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, N>))
        .route(
            "/users/{user_id}/orders",
            get(routes::orders::list_by_user::<S, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the services around `store` with an explicit notifier.
pub fn create_state<S, N>(store: S, notifier: N, config: EngineConfig) -> Arc<AppState<S, N>>
where
    S: LedgerStore + Clone + 'static,
    N: Notifier + 'static,
{
    Arc::new(AppState {
        inventory: InventoryService::new(store.clone(), config),
        orders: OrderService::new(store, notifier, config),
    })
}

/// Creates the default application state: the services plus the in-process
/// notification queue, whose worker the caller must spawn.
pub fn create_default_state<S>(
    store: S,
    config: EngineConfig,
    queue_capacity: usize,
) -> (
    Arc<AppState<S, QueueNotifier>>,
    NotificationWorker<LogSink>,
)
where
    S: LedgerStore + Clone + 'static,
{
    let (notifier, worker) = QueueNotifier::with_worker(queue_capacity, LogSink);
    (create_state(store, notifier, config), worker)
}
