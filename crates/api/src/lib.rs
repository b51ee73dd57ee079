//! HTTP API server with observability for the payment consistency engine.
//!
//! Provides the signed webhook intake, checkout-side reservation endpoints,
//! and order/stock lookups, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::ReservationEngine;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use webhook::{
    NotificationService, SignatureVerifier, TracingNotificationService, WebhookProcessor,
};

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static, N: NotificationService + 'static>(
    state: Arc<AppState<S, N>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhooks/payments", post(routes::webhooks::receive::<S, N>))
        .route("/orders", post(routes::orders::create::<S, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, N>))
        .route("/orders/{id}/history", get(routes::orders::history::<S, N>))
        .route(
            "/orders/{id}/reservations",
            post(routes::orders::reserve::<S, N>).delete(routes::orders::release::<S, N>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, N>))
        .route("/stock/{variant_id}", get(routes::stock::get::<S, N>))
        .route(
            "/stock/{variant_id}/adjustments",
            post(routes::stock::adjust::<S, N>),
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

/// Creates application state around a storage backend and a notification
/// service.
pub fn create_state<S: Store + Clone + 'static, N: NotificationService>(
    store: S,
    config: &Config,
    notifier: N,
) -> Arc<AppState<S, N>> {
    let verifier = config
        .webhook_signing_secret
        .as_ref()
        .map(|secret| SignatureVerifier::new(secret.clone(), config.webhook_tolerance_secs));

    Arc::new(AppState {
        reservations: ReservationEngine::new(store.clone(), config.low_stock_threshold),
        webhooks: WebhookProcessor::new(store.clone(), verifier, notifier),
        store,
    })
}

/// Creates the default application state with the tracing-only notifier.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S, TracingNotificationService>> {
    create_state(store, config, TracingNotificationService)
}
