//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Anomalies
        .route("/anomalies/overview", get(handlers::get_overview))
        .route("/anomalies/pending", get(handlers::total_pending))
        .route("/anomalies/bulk-resolve", post(handlers::bulk_resolve))
        .route("/anomalies/:id", get(handlers::get_anomaly))
        .route("/anomalies/:id/resolve", post(handlers::resolve_anomaly))
        // Batches
        .route("/batches/:batch_id/anomalies", post(handlers::register_anomalies))
        .route("/batches/:batch_id", delete(handlers::delete_batch))
        // Tasks
        .route("/tasks/:task_id/pending", get(handlers::task_pending));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
