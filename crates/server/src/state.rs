use std::sync::Arc;
use std::time::Instant;

use feedline_core::config::Config;
use feedline_feedhealth::FeedHealthCache;
use feedline_lock::LockManager;
use feedline_metrics::MetricsSink;
use feedline_pipeline::PipelineRunner;
use feedline_planner::BatchPlanner;
use sqlx::PgPool;

/// Shared application state (spec.md §6's RPC surface). Every handler works
/// against one of these directly -- there is no further indirection layer
/// between the router and the orchestration crates.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub planner: Arc<BatchPlanner>,
    pub runner: Arc<PipelineRunner>,
    pub locks: Arc<LockManager>,
    pub feed_health: Arc<FeedHealthCache>,
    pub metrics: Option<MetricsSink>,
    pub started_at: Instant,
}
