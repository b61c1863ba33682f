//! Cooperative scheduling loops (spec.md §4.11): batch creation, hourly
//! maintenance, and emergency-overload monitoring. None of these loops do
//! the work themselves -- they only enqueue tasks onto `feedline-queue` for
//! a worker to pick up, the same way `feedline-backpressure`'s monitor only
//! ever recommends an adjustment rather than applying one itself.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use feedline_core::config::SchedulerConfig;
use feedline_core::LockType;
use feedline_lock::{LockManager, LockStatus};
use feedline_metrics::{empty_tags, MetricsSink};
use feedline_planner::BatchPlanner;
use feedline_queue::{QueueName, Task, TaskQueue};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::error::SchedulerError;

const LEADER_LOCK_KEY: &str = "scheduler:leader";
/// Held for 3x the shortest loop interval so `LockManager`'s auto-renewal
/// (which fires at `ttl / 3`) keeps the lease alive across the scheduler's
/// whole lifetime without the scheduler itself having to remember to renew.
const LEADER_LOCK_TTL_SECONDS: u64 = 90;
const LEADERSHIP_RETRY_SECONDS: u64 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

enum BatchPriorityTier {
    High,
    Normal,
    Low,
}

impl BatchPriorityTier {
    fn for_pending(pending_articles: i64) -> Self {
        if pending_articles > 5000 {
            BatchPriorityTier::High
        } else if pending_articles > 1000 {
            BatchPriorityTier::Normal
        } else {
            BatchPriorityTier::Low
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            BatchPriorityTier::High => "high",
            BatchPriorityTier::Normal => "normal",
            BatchPriorityTier::Low => "low",
        }
    }
}

/// Drives the three scheduling loops for one worker process. Only one
/// scheduler process across the fleet should be the leader at a time; the
/// rest sit in `try_become_leader`'s retry loop so a restart elsewhere picks
/// up cleanly once the held lock expires.
pub struct Scheduler {
    worker_id: String,
    config: SchedulerConfig,
    planner: Arc<BatchPlanner>,
    queue: Arc<TaskQueue>,
    locks: Arc<LockManager>,
    metrics: Option<MetricsSink>,
    last_batch_created: Mutex<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(
        worker_id: impl Into<String>,
        config: SchedulerConfig,
        planner: Arc<BatchPlanner>,
        queue: Arc<TaskQueue>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            config,
            planner,
            queue,
            locks,
            metrics: None,
            last_batch_created: Mutex::new(Utc::now()),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Blocks (cooperatively) until this process holds `scheduler:leader`,
    /// then runs all three loops until `shutdown` fires, and finally
    /// releases the lock. Intended to be driven inside its own
    /// `tokio::spawn`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.become_leader(&mut shutdown).await {
            return;
        }

        info!(worker_id = %self.worker_id, "scheduler acquired leadership, starting loops");

        let batch_loop = tokio::spawn(self.clone().run_batch_creation_loop(shutdown.clone()));
        let maintenance_loop = tokio::spawn(self.clone().run_maintenance_loop(shutdown.clone()));
        let emergency_loop = tokio::spawn(self.clone().run_emergency_monitor_loop(shutdown.clone()));

        let _ = tokio::join!(batch_loop, maintenance_loop, emergency_loop);

        if let Err(e) = self.locks.release_lock(LEADER_LOCK_KEY, &self.worker_id).await {
            warn!(error = %e, "failed to release scheduler leader lock on shutdown");
        }
    }

    async fn become_leader(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut retry = tokio::time::interval(StdDuration::from_secs(LEADERSHIP_RETRY_SECONDS));
        loop {
            let status = self
                .locks
                .acquire_lock(
                    LEADER_LOCK_KEY,
                    &self.worker_id,
                    Some(StdDuration::from_secs(LEADER_LOCK_TTL_SECONDS)),
                    LockType::Exclusive,
                    true,
                    serde_json::json!({ "critical": true, "role": "scheduler" }),
                )
                .await;

            match status {
                Ok(LockStatus::Acquired) | Ok(LockStatus::Renewed) => return true,
                Ok(_denied) => {}
                Err(e) => warn!(error = %e, "scheduler leader lock acquisition failed, retrying"),
            }

            tokio::select! {
                _ = retry.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }

    /// Every `batch_creation_interval_seconds` (default 30s): reads queue
    /// depth from the planner and enqueues one `create_batch` task at a
    /// priority tier derived from that depth.
    async fn run_batch_creation_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(self.config.batch_creation_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_batch_creation().await {
                        warn!(error = %e, "batch creation tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick_batch_creation(&self) -> Result<(), SchedulerError> {
        let status = self.planner.queue_status().await?;
        let tier = BatchPriorityTier::for_pending(status.pending_articles);

        let task = Task::new(
            "create_batch",
            serde_json::json!({ "priority_tier": tier.as_str(), "pending_articles": status.pending_articles }),
            QueueName::BatchProcessing.priority(),
            DEFAULT_MAX_ATTEMPTS,
        );
        self.queue.enqueue(QueueName::BatchProcessing, &task).await?;
        *self.last_batch_created.lock().await = Utc::now();

        if let Some(m) = &self.metrics {
            m.incr("scheduler.batch_creation.enqueued", 1.0, empty_tags());
            m.gauge("scheduler.queue.pending_articles", status.pending_articles as f64, empty_tags());
        }
        info!(pending = status.pending_articles, tier = tier.as_str(), "enqueued create_batch task");
        Ok(())
    }

    /// Hourly: enqueues the housekeeping tasks that keep the lock table and
    /// feed-health scores from drifting between batch runs.
    async fn run_maintenance_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(self.config.maintenance_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_maintenance().await {
                        warn!(error = %e, "maintenance tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick_maintenance(&self) -> Result<(), SchedulerError> {
        let cleanup = Task::new("cleanup_expired_locks", serde_json::json!({}), QueueName::Maintenance.priority(), DEFAULT_MAX_ATTEMPTS);
        self.queue.enqueue(QueueName::Maintenance, &cleanup).await?;

        let health_check = Task::new("feed_health_check", serde_json::json!({}), QueueName::Maintenance.priority(), DEFAULT_MAX_ATTEMPTS);
        self.queue.enqueue(QueueName::Maintenance, &health_check).await?;

        if let Some(m) = &self.metrics {
            m.incr("scheduler.maintenance.enqueued", 2.0, empty_tags());
        }
        info!("enqueued maintenance tasks");
        Ok(())
    }

    /// Every `emergency_check_interval_seconds` (default 60s): if the queue
    /// is both deep and stale -- no batch created recently despite the
    /// backlog -- enqueues one oversized, critical-priority batch task.
    async fn run_emergency_monitor_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(self.config.emergency_check_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_emergency_monitor().await {
                        warn!(error = %e, "emergency monitor tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick_emergency_monitor(&self) -> Result<(), SchedulerError> {
        let status = self.planner.queue_status().await?;
        if status.pending_articles <= self.config.emergency_queue_depth_threshold as i64 {
            return Ok(());
        }

        let staleness = Utc::now() - *self.last_batch_created.lock().await;
        if staleness.num_seconds() <= self.config.emergency_staleness_seconds {
            return Ok(());
        }

        let task = Task::new(
            "emergency_batch",
            serde_json::json!({ "max_size": self.config.emergency_batch_size }),
            QueueName::Emergency.priority(),
            DEFAULT_MAX_ATTEMPTS,
        );
        self.queue.enqueue(QueueName::Emergency, &task).await?;
        *self.last_batch_created.lock().await = Utc::now();

        if let Some(m) = &self.metrics {
            m.incr("scheduler.emergency_batch.enqueued", 1.0, empty_tags());
        }
        warn!(
            pending = status.pending_articles,
            staleness_seconds = staleness.num_seconds(),
            "queue depth and staleness exceeded thresholds, enqueued emergency batch"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_tier_matches_spec_thresholds() {
        assert_eq!(BatchPriorityTier::for_pending(6000).as_str(), "high");
        assert_eq!(BatchPriorityTier::for_pending(1500).as_str(), "normal");
        assert_eq!(BatchPriorityTier::for_pending(200).as_str(), "low");
        assert_eq!(BatchPriorityTier::for_pending(5000).as_str(), "normal");
        assert_eq!(BatchPriorityTier::for_pending(1000).as_str(), "low");
    }
}
