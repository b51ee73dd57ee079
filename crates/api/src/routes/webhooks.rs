//! Inbound payment provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;
use store::Store;
use webhook::{NotificationService, Outcome};

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

/// POST /webhooks/payments — verifies and processes one provider delivery.
///
/// The raw body bytes are handed to the processor untouched; the signature
/// covers them byte for byte.
#[tracing::instrument(skip_all)]
pub async fn receive<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.process(&body, signature).await?;

    let outcome = match outcome {
        Outcome::Processed => "processed",
        Outcome::Duplicate => "duplicate",
        Outcome::Ignored => "ignored",
    };
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
