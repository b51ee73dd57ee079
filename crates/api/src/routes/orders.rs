//! Order creation, lookup, reservation, and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{Money, OrderId, VariantId};
use domain::Order;
use reservation::{ReservationEngine, ReservationItem};
use serde::{Deserialize, Serialize};
use store::Store;
use webhook::{NotificationService, WebhookProcessor};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, N: NotificationService> {
    pub store: S,
    pub reservations: ReservationEngine<S>,
    pub webhooks: WebhookProcessor<S, N>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub total_minor: i64,
    pub currency: String,
    pub checkout_session_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub variant_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub items: Vec<OrderItemRequest>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub total_minor: i64,
    pub refunded_minor: i64,
    pub refund_count: u32,
    pub currency: String,
    pub paid_at: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub old_status: String,
    pub new_status: String,
    pub reason: String,
    pub provider_event_id: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ReservedResponse {
    pub reserved: bool,
}

#[derive(Serialize)]
pub struct ReleasedResponse {
    pub released: usize,
}

// -- Handlers --

/// POST /orders — create a pending order, optionally reserving stock for
/// its items in the same request. If the reservation fails, the freshly
/// created order is cancelled and nothing stays held.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderCreatedResponse>), ApiError> {
    if req.total_minor <= 0 {
        return Err(ApiError::BadRequest(
            "total_minor must be positive".to_string(),
        ));
    }
    let items = parse_items(&req.items)?;

    let mut order = Order::new(
        OrderId::new(),
        Money::from_minor(req.total_minor),
        req.currency.as_str(),
    );
    if let Some(session_id) = &req.checkout_session_id {
        order = order.with_checkout_session(session_id.as_str());
    }
    let order_id = order.id;
    let status = order.status;
    state.store.insert_order(order).await?;

    if !items.is_empty() {
        let outcome = state
            .reservations
            .reserve_stock_for_order(order_id, &items)
            .await?;
        if !outcome.reserved {
            state.store.cancel_order(order_id).await?;
            return Err(ApiError::InsufficientStock(outcome.insufficient));
        }
    }

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order_id.to_string(),
            status: status.to_string(),
        }),
    ))
}

/// GET /orders/:id — load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order_to_response(&order)))
}

/// GET /orders/:id/history — the order's status audit trail, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    let rows = state.store.status_history_for_order(order_id).await?;
    let entries = rows
        .into_iter()
        .map(|row| HistoryEntryResponse {
            old_status: row.old_status.to_string(),
            new_status: row.new_status.to_string(),
            reason: row.reason,
            provider_event_id: row.provider_event_id,
            created_at: row.created_at.to_rfc3339(),
        })
        .collect();
    Ok(Json(entries))
}

/// POST /orders/:id/reservations — reserve stock for the order's items,
/// all or nothing.
#[tracing::instrument(skip(state, req))]
pub async fn reserve<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReservedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let items = parse_items(&req.items)?;
    if items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }

    let outcome = state
        .reservations
        .reserve_stock_for_order(order_id, &items)
        .await?;
    if !outcome.reserved {
        return Err(ApiError::InsufficientStock(outcome.insufficient));
    }
    Ok(Json(ReservedResponse { reserved: true }))
}

/// DELETE /orders/:id/reservations — release everything the order holds.
/// Idempotent: a second call releases nothing.
#[tracing::instrument(skip(state))]
pub async fn release<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<ReleasedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let released = state.reservations.release_stock_for_order(order_id).await?;
    Ok(Json(ReleasedResponse { released }))
}

/// POST /orders/:id/cancel — cancel a pending or paid order and release
/// its stock reservations.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    if !state.store.cancel_order(order_id).await? {
        return Err(ApiError::Conflict(format!(
            "Order {id} can no longer be cancelled"
        )));
    }
    state.reservations.release_stock_for_order(order_id).await?;

    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order_to_response(&order)))
}

fn order_to_response(order: &Order) -> OrderResponse {
    OrderResponse {
        id: order.id.to_string(),
        status: order.status.to_string(),
        total_minor: order.total_net.minor(),
        refunded_minor: order.refunded_amount.minor(),
        refund_count: order.refund_count,
        currency: order.currency.clone(),
        paid_at: order.paid_at.map(|t| t.to_rfc3339()),
        created_at: order.created_at.to_rfc3339(),
    }
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

fn parse_items(items: &[OrderItemRequest]) -> Result<Vec<ReservationItem>, ApiError> {
    items
        .iter()
        .map(|item| {
            if item.quantity == 0 {
                return Err(ApiError::BadRequest(
                    "item quantity must be positive".to_string(),
                ));
            }
            let uuid = uuid::Uuid::parse_str(&item.variant_id)
                .map_err(|e| ApiError::BadRequest(format!("Invalid variant_id: {e}")))?;
            Ok(ReservationItem {
                variant_id: VariantId::from_uuid(uuid),
                quantity: item.quantity,
            })
        })
        .collect()
}
