//! HTTP router construction (spec.md §6's RPC surface plus health/metrics).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::health;
use crate::rpc;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics_text))
        .route("/rpc/process_batch", post(rpc::process_batch))
        .route("/rpc/create_batch", post(rpc::create_batch))
        .route("/rpc/emergency_batch", post(rpc::emergency_batch))
        .route("/rpc/cleanup_expired_locks", post(rpc::cleanup_expired_locks))
        .route("/rpc/feed_health_check", post(rpc::feed_health_check))
        .route("/queue/status", get(rpc::queue_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
