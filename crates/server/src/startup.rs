//! Server startup: shared state initialization and background task spawning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};

use feedline_core::config::Config;
use feedline_feedhealth::FeedHealthCache;
use feedline_idempotency::IdempotencyStore;
use feedline_lock::LockManager;
use feedline_metrics::{spawn_flush_loop, MetricsSink};
use feedline_pipeline::PipelineRunner;
use feedline_planner::BatchPlanner;
use feedline_queue::TaskQueue;
use feedline_scheduler::Scheduler;
use feedline_state::StateManager;

use crate::state::AppState;

const METRICS_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Build `AppState`, connecting to Postgres and Redis and wiring the
/// orchestration crates (planner, pipeline runner, locks, feed health cache)
/// together the way the teacher's `build_app_state` assembles its stores.
pub async fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.connection_string())
        .await?;
    info!("connected to postgres ({} max connections)", config.database.max_connections);

    let redis_client = redis::Client::open(config.cache.url.clone())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    info!("connected to redis");

    let metrics = MetricsSink::new(100, 10_000);

    let lock_manager = LockManager::new(redis.clone(), pool.clone(), Duration::from_secs(30)).with_metrics(metrics.clone());
    let state_manager = Arc::new(StateManager::new(pool.clone(), redis.clone(), lock_manager.clone()));
    let idempotency = Arc::new(IdempotencyStore::new(redis.clone()).with_metrics(metrics.clone()));
    let feed_health = Arc::new(FeedHealthCache::new(pool.clone()));

    let planner = Arc::new(
        BatchPlanner::new(pool.clone(), redis.clone(), lock_manager.clone())
            .with_metrics(metrics.clone())
            .with_error_rate_weight(config.backpressure.error_rate_weight),
    );
    let locks = Arc::new(lock_manager);
    let runner = Arc::new(
        PipelineRunner::new(pool.clone(), redis.clone(), config.pipeline.clone(), state_manager, idempotency)
            .with_metrics(metrics.clone()),
    );

    Ok(Arc::new(AppState {
        config,
        pool,
        redis,
        planner,
        runner,
        locks,
        feed_health,
        metrics: Some(metrics),
        started_at: Instant::now(),
    }))
}

/// Spawn the metrics flush loop and the in-process scheduler leader loop.
/// Both run for the lifetime of the server; `shutdown` (broadcast via
/// `watch`) stops them cleanly on `ctrl_c`.
pub async fn spawn_background_tasks(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    if let Some(metrics) = state.metrics.clone() {
        spawn_flush_loop(metrics, state.pool.clone(), state.redis.clone(), METRICS_FLUSH_INTERVAL, shutdown.clone());
    }

    if state.config.queue.batch_processing_url.is_none() {
        warn!("no SQS queue URLs configured -- scheduler will enqueue into whichever named queues are configured, skipping the rest");
    }
    let queue = Arc::new(TaskQueue::from_config(&state.config.aws, &state.config.queue, state.pool.clone()).await?);

    let mut scheduler = Scheduler::new(
        state.config.worker_id.clone(),
        state.config.scheduler.clone(),
        state.planner.clone(),
        queue,
        state.locks.clone(),
    );
    if let Some(metrics) = state.metrics.clone() {
        scheduler = scheduler.with_metrics(metrics);
    }
    tokio::spawn(Arc::new(scheduler).run(shutdown));

    Ok(())
}
