//! Health and text-format metrics export (spec.md §6).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: f64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
    })
}

/// One line per metric: `name{k="v",...} value timestamp_ms` (spec.md §6).
pub async fn metrics_text(State(state): State<Arc<AppState>>) -> String {
    state.metrics.as_ref().map(|m| m.export_text()).unwrap_or_default()
}
