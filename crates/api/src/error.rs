//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reservation::InsufficientItem;
use store::StoreError;
use webhook::WebhookError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The operation no longer applies to the resource's current state.
    Conflict(String),
    /// Not enough stock to satisfy a reservation.
    InsufficientStock(Vec<InsufficientItem>),
    /// Webhook processing error.
    Webhook(WebhookError),
    /// Storage error.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::InsufficientStock(items) = self {
            let detail: Vec<_> = items
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "variant_id": item.variant_id.to_string(),
                        "requested": item.requested,
                        "available": item.available,
                    })
                })
                .collect();
            let body = serde_json::json!({
                "error": "insufficient stock",
                "insufficient": detail,
            });
            return (StatusCode::CONFLICT, axum::Json(body)).into_response();
        }

        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Webhook(err) => webhook_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::InsufficientStock(_) => unreachable!("handled above"),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, String) {
    match &err {
        // The provider redelivers on non-2xx; a rejected delivery must not
        // be acknowledged.
        WebhookError::InvalidSignature(_) | WebhookError::InvalidPayload(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        WebhookError::MissingSecret => {
            tracing::error!("webhook received but no signing secret is configured");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        // Invariant violations: fail the delivery so it is retried against
        // a consistent view. An alert is already on file.
        WebhookError::RefundExceedsTotal { .. } | WebhookError::ConcurrentRefundRejected(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        WebhookError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!(error = %err, "storage error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
