//! Stock inspection and operator adjustment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::VariantId;
use domain::MovementKind;
use serde::{Deserialize, Serialize};
use store::Store;
use webhook::NotificationService;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct StockResponse {
    pub variant_id: String,
    pub available: i64,
}

#[derive(Deserialize)]
pub struct AdjustmentRequest {
    pub delta: i64,
}

/// GET /stock/:variant_id — on-hand stock, computed from the ledger.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(variant_id): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    let variant_id = parse_variant_id(&variant_id)?;
    let available = state.store.available_stock(variant_id).await?;
    Ok(Json(StockResponse {
        variant_id: variant_id.to_string(),
        available,
    }))
}

/// POST /stock/:variant_id/adjustments — append a manual ledger movement
/// (stock intake, corrections). Negative deltas are allowed and may drive
/// on-hand stock negative; operators own that tradeoff.
#[tracing::instrument(skip(state, req))]
pub async fn adjust<S: Store + Clone + 'static, N: NotificationService + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(variant_id): Path<String>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    if req.delta == 0 {
        return Err(ApiError::BadRequest("delta must be non-zero".to_string()));
    }
    let variant_id = parse_variant_id(&variant_id)?;

    state
        .store
        .insert_adjustment(variant_id, req.delta, MovementKind::Adjustment)
        .await?;
    let available = state.store.available_stock(variant_id).await?;
    Ok(Json(StockResponse {
        variant_id: variant_id.to_string(),
        available,
    }))
}

fn parse_variant_id(id: &str) -> Result<VariantId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid variant ID format: {e}")))?;
    Ok(VariantId::from_uuid(uuid))
}
