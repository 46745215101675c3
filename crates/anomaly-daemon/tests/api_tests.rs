//! REST API tests against the in-memory backend

use anomaly_daemon::api::create_router;
use anomaly_daemon::api::rest::state::AppState;
use anomaly_store::InMemoryAnomalyStore;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    create_router(AppState::new(Arc::new(InMemoryAnomalyStore::new())), true)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/batches/batch-1/anomalies",
        Some(json!({
            "taskNumericId": 12,
            "records": [
                {
                    "anomalyId": "dup-1",
                    "areaName": "Warehouse-A",
                    "timestamp": "2024-05-01T08:00:00Z",
                    "type": "duplicate",
                    "variants": [{"variantId": "a", "existingCount": 2, "newCount": 0},
                                 {"variantId": "b", "existingCount": 0, "newCount": 5}]
                },
                {
                    "anomalyId": "conf-1",
                    "areaName": "Warehouse-A",
                    "timestamp": "2024-05-01T09:00:00Z",
                    "type": "conflict",
                    "variants": [{"variantId": "a", "existingCount": 2, "newCount": 0},
                                 {"variantId": "b", "existingCount": 0, "newCount": 5}]
                }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registered"], 2);
}

#[tokio::test]
async fn health_reports_backend() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn overview_groups_registered_anomalies() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, Method::GET, "/api/v1/anomalies/overview", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicates"]["pendingCount"], 1);
    assert_eq!(body["duplicates"]["recordCount"], 5);
    assert_eq!(body["duplicates"]["areaSummaries"][0]["areaName"], "Warehouse-A");
    assert_eq!(body["conflicts"][0]["areaName"], "Warehouse-A");
    assert_eq!(body["conflicts"][0]["anomalies"][0]["status"], "pending");
    assert_eq!(
        body["conflicts"][0]["anomalies"][0]["timestamp"],
        "2024-05-01T09:00:00.000Z"
    );

    let (_, pending) = call(&app, Method::GET, "/api/v1/anomalies/pending", None).await;
    assert_eq!(pending["totalPending"], 2);

    let (_, task) = call(&app, Method::GET, "/api/v1/tasks/12/pending", None).await;
    assert_eq!(task["pendingCount"], 2);
}

#[tokio::test]
async fn lookup_and_resolve_single_anomaly() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, Method::GET, "/api/v1/anomalies/conf-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["batchId"], "batch-1");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/anomalies/conf-1/resolve",
        Some(json!({"action": "overwrite", "chooseVariantId": "nonexistent-variant"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "VARIANT_NOT_FOUND");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/anomalies/conf-1/resolve",
        Some(json!({"action": "overwrite"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolvedVariant"]["variantId"], "b");
    assert_eq!(body["taskNumericId"], 12);

    let (status, _) = call(&app, Method::GET, "/api/v1/anomalies/conf-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_resolve_only_touches_requested_type() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/anomalies/bulk-resolve",
        Some(json!({"type": "duplicate", "action": "skip", "anomalyIds": ["conf-1", "dup-1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["anomalyId"], "dup-1");
    assert_eq!(body[0]["resolvedVariant"]["variantId"], "a");

    let (status, _) = call(&app, Method::GET, "/api/v1/anomalies/conf-1", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_batch_discards_everything() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, Method::DELETE, "/api/v1/batches/batch-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    let (_, pending) = call(&app, Method::GET, "/api/v1/anomalies/pending", None).await;
    assert_eq!(pending["totalPending"], 0);
}

#[tokio::test]
async fn register_rejects_blank_ids() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/batches/batch-1/anomalies",
        Some(json!({
            "taskNumericId": 1,
            "records": [{
                "anomalyId": "",
                "areaName": "A",
                "timestamp": "2024-05-01T08:00:00Z",
                "type": "duplicate"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}
