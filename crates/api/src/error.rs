//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_engine::EngineError;
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Request rejected before reaching the engine.
    BadRequest(String),
    /// Error raised by the engine.
    Engine(EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Engine(err) => engine_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, Value) {
    let message = err.to_string();
    match err {
        EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "error": message })),
        EngineError::ProductsNotFound(ids) => (
            StatusCode::NOT_FOUND,
            json!({ "error": message, "product_ids": ids }),
        ),
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
        EngineError::InsufficientStock {
            product_id,
            available,
            requested,
        } => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": message,
                "product_id": product_id,
                "available": available,
                "requested": requested,
            }),
        ),
        EngineError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            json!({ "error": message, "from": from, "to": to }),
        ),
        EngineError::DuplicateSku(_) | EngineError::ProductInUse(_) => {
            (StatusCode::CONFLICT, json!({ "error": message }))
        }
        EngineError::TransactionConflict(_) | EngineError::DependencyUnavailable(_) => {
            tracing::warn!(error = %message, "request failed with a transient error");
            (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
        }
        EngineError::Internal(_) => {
            tracing::error!(error = %message, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal server error" }),
            )
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
