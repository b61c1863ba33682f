//! Handlers for spec.md §6's "Queue/RPC surface exposed to external
//! submitters" -- thin JSON-over-HTTP wrappers, the same way the teacher
//! exposes its compute/graph RPC-style operations through plain Axum routes
//! rather than a separate RPC framework.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use feedline_core::entities::BatchPriority;
use feedline_planner::{create_emergency_batch, BatchConfiguration};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::feedhealth_job::run_feed_health_check;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessBatchRequest {
    pub batch_id: String,
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessBatchResponse {
    pub success: bool,
    pub articles_processed: usize,
    pub articles_successful: usize,
    pub processing_time: f64,
}

/// `process_batch(batch_id, worker_id?) → {success, articles_processed, articles_successful, processing_time}`.
pub async fn process_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessBatchRequest>,
) -> Result<Json<ProcessBatchResponse>, ServerError> {
    let worker_id = req.worker_id.unwrap_or_else(|| state.config.worker_id.clone());
    let result = state.runner.process_batch(&req.batch_id, &worker_id).await?;
    Ok(Json(ProcessBatchResponse {
        success: result.success,
        articles_processed: result.articles_processed,
        articles_successful: result.articles_successful,
        processing_time: result.processing_time_seconds,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub worker_id: Option<String>,
    #[serde(default)]
    pub priority: Option<BatchPriority>,
}

#[derive(Debug, Serialize)]
pub struct CreateBatchResponse {
    pub batch_id: Option<String>,
}

/// `create_batch(worker_id?, batch_config?, priority) → batch_id | null`.
/// `batch_config` is not accepted over the wire -- every field besides
/// priority comes from the process-wide `PlannerConfig` defaults, matching
/// `BatchConfiguration::from_defaults`.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<Json<CreateBatchResponse>, ServerError> {
    let worker_id = req.worker_id.unwrap_or_else(|| state.config.worker_id.clone());
    let priority = req.priority.unwrap_or(BatchPriority::Normal);
    let config = BatchConfiguration::from_defaults(&state.config.planner, priority);
    let batch_id = state.planner.create_batch(&config, &worker_id, None).await?;
    Ok(Json(CreateBatchResponse { batch_id }))
}

#[derive(Debug, Deserialize)]
pub struct EmergencyBatchRequest {
    #[serde(default = "default_emergency_size")]
    pub max_size: u32,
    pub worker_id: Option<String>,
}

fn default_emergency_size() -> u32 {
    50
}

/// `emergency_batch(max_size=50, worker_id?) → batch_id | null`.
pub async fn emergency_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmergencyBatchRequest>,
) -> Result<Json<CreateBatchResponse>, ServerError> {
    let worker_id = req.worker_id.unwrap_or_else(|| state.config.worker_id.clone());
    let batch_id = create_emergency_batch(&state.planner, &worker_id, req.max_size).await?;
    Ok(Json(CreateBatchResponse { batch_id }))
}

#[derive(Debug, Serialize)]
pub struct CleanupLocksResponse {
    pub count: u64,
}

/// `cleanup_expired_locks() → integer count`.
pub async fn cleanup_expired_locks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupLocksResponse>, ServerError> {
    let count = state.planner.cleanup_expired_locks().await?;
    Ok(Json(CleanupLocksResponse { count }))
}

#[derive(Debug, Deserialize, Default)]
pub struct FeedHealthCheckRequest {
    pub feed_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct FeedHealthCheckResponse {
    pub updated_feeds: u64,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// `feed_health_check(feed_ids?) → {updated_feeds, checked_at}`.
pub async fn feed_health_check(
    State(state): State<Arc<AppState>>,
    body: Option<Json<FeedHealthCheckRequest>>,
) -> Result<Json<FeedHealthCheckResponse>, ServerError> {
    let feed_ids = body.and_then(|Json(r)| r.feed_ids);
    let result = run_feed_health_check(&state.pool, &state.feed_health, feed_ids.as_deref()).await?;
    Ok(Json(FeedHealthCheckResponse { updated_feeds: result.updated_feeds, checked_at: result.checked_at }))
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    #[serde(flatten)]
    pub status: feedline_planner::BatchQueueStatus,
}

/// Operational `queue_status()` snapshot (spec.md §4.7 supplement), used by
/// the CLI's `status` command.
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Result<Json<QueueStatusResponse>, ServerError> {
    let status = state.planner.queue_status().await?;
    Ok(Json(QueueStatusResponse { status }))
}
