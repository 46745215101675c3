//! Batch and task handlers used by the import pipeline

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use anomaly_store::AnomalyRecord;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

/// Register request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub task_numeric_id: i64,
    #[serde(default)]
    pub records: Vec<AnomalyRecord>,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub registered: usize,
}

/// Register anomalies discovered for a batch
pub async fn register_anomalies(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    if request.records.iter().any(|r| r.anomaly_id.is_empty()) {
        return Err(ApiError::BadRequest("anomalyId must not be empty".to_string()));
    }

    let registered = request.records.len();
    state
        .store
        .register(&batch_id, request.task_numeric_id, request.records)
        .await?;

    Ok(Json(RegisterResponse { registered }))
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Discard every anomaly of a batch
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.store.delete_batch(&batch_id).await?;

    if deleted > 0 {
        tracing::info!(batch_id = %batch_id, deleted, "Deleted anomaly batch");
    }

    Ok(Json(DeleteResponse { deleted }))
}

/// Task pending response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPendingResponse {
    pub task_numeric_id: i64,
    pub pending_count: usize,
}

/// Pending anomalies of one import task
pub async fn task_pending(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<TaskPendingResponse>> {
    let pending_count = state.store.pending_count_for_task(task_id).await?;

    Ok(Json(TaskPendingResponse {
        task_numeric_id: task_id,
        pending_count,
    }))
}
