//! Anomaly query and resolution handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use anomaly_store::{
    Anomaly, AnomalyOverview, AnomalyType, BulkResolvedAnomaly, ResolveAction, ResolvedAnomaly,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

/// Area-grouped overview of pending anomalies
pub async fn get_overview(State(state): State<AppState>) -> ApiResult<Json<AnomalyOverview>> {
    Ok(Json(state.store.overview().await?))
}

/// Total pending response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalPendingResponse {
    pub total_pending: usize,
}

/// Count of all pending anomalies
pub async fn total_pending(State(state): State<AppState>) -> ApiResult<Json<TotalPendingResponse>> {
    Ok(Json(TotalPendingResponse {
        total_pending: state.store.total_pending().await?,
    }))
}

/// Get a single anomaly
pub async fn get_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Anomaly>> {
    let anomaly = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Anomaly {} not found", id)))?;

    Ok(Json(anomaly))
}

/// Resolve request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub action: ResolveAction,
    #[serde(default)]
    pub choose_variant_id: Option<String>,
}

/// Resolve a single anomaly
pub async fn resolve_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolvedAnomaly>> {
    let resolved = state
        .store
        .resolve_one(&id, request.action, request.choose_variant_id.as_deref())
        .await?;

    tracing::info!(anomaly_id = %id, action = %request.action, "Resolved anomaly");

    Ok(Json(resolved))
}

/// Bulk resolve request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResolveRequest {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub action: ResolveAction,
    pub anomaly_ids: Vec<String>,
}

/// Resolve many anomalies of one type; only successes are returned
pub async fn bulk_resolve(
    State(state): State<AppState>,
    Json(request): Json<BulkResolveRequest>,
) -> ApiResult<Json<Vec<BulkResolvedAnomaly>>> {
    let resolved = state
        .store
        .bulk_resolve(request.anomaly_type, request.action, &request.anomaly_ids)
        .await?;

    tracing::info!(
        anomaly_type = %request.anomaly_type,
        action = %request.action,
        requested = request.anomaly_ids.len(),
        resolved = resolved.len(),
        "Bulk resolved anomalies"
    );

    Ok(Json(resolved))
}
