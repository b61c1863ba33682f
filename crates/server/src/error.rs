use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("planner error: {0}")]
    Planner(#[from] feedline_planner::PlannerError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] feedline_pipeline::PipelineError),
    #[error("lock error: {0}")]
    Lock(#[from] feedline_lock::LockError),
    #[error("feed health error: {0}")]
    FeedHealth(#[from] feedline_feedhealth::FeedHealthError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Maps every RPC failure onto a 500 with a JSON body -- none of spec.md
/// §6's RPCs distinguish client vs. server error classes, so this is a flat
/// fallback rather than a per-variant status mapping.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "rpc handler failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
