use std::time::Duration;

use chrono::Utc;
use feedline_core::entities::{BatchPriority, LockType};
use feedline_core::hashing::config_hash;
use feedline_feedhealth::FeedHealthCache;
use feedline_lock::{LockManager, LockStatus};
use feedline_metrics::{empty_tags, MetricsSink};
use rand::Rng;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use crate::error::PlannerError;
use crate::selection::ArticleFilter;
use crate::sizing::{calculate_optimal_batch_size, SizingHistory};
use crate::types::{BatchConfiguration, LoadMetrics};

const BATCH_CREATION_LOCK_KEY: &str = "batch_creation";
const ARTICLE_LEASE: Duration = Duration::from_secs(2 * 3600);

/// Queue depth / active-batch counters reported by `queue_status` (spec.md
/// §4.7's `get_batch_queue_status`, a supplemented operational surface).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchQueueStatus {
    pub pending_articles: i64,
    pub processing_articles: i64,
    pub active_batches: i64,
    pub active_workers: i64,
    pub avg_queue_age_hours: f64,
    pub batch_status_distribution: Vec<BatchStatusBucket>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchStatusBucket {
    pub status: String,
    pub count: i64,
    pub avg_size: f64,
    pub avg_age_hours: f64,
}

/// Intelligent batch planner with adaptive sizing, feed prioritization,
/// domain diversity, and per-feed circuit-breaker filtering.
pub struct BatchPlanner {
    pool: PgPool,
    redis: redis::aio::ConnectionManager,
    locks: LockManager,
    health_cache: FeedHealthCache,
    metrics: Option<MetricsSink>,
    sizing_history: SizingHistory,
    /// Passed through to `LoadMetrics::load_factor` (spec.md §4.7 step 2,
    /// reusing §4.5's formula); defaults to `BackpressureConfig`'s own
    /// default so the two loops agree even when the caller doesn't wire
    /// the process-wide config in explicitly.
    error_rate_weight: f64,
}

impl BatchPlanner {
    pub fn new(pool: PgPool, redis: redis::aio::ConnectionManager, locks: LockManager) -> Self {
        let health_cache = FeedHealthCache::new(pool.clone());
        Self {
            pool,
            redis,
            locks,
            health_cache,
            metrics: None,
            sizing_history: SizingHistory::new(),
            error_rate_weight: 2.0,
        }
    }

    pub fn with_error_rate_weight(mut self, error_rate_weight: f64) -> Self {
        self.error_rate_weight = error_rate_weight;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// `create_batch(config, worker_id, correlation_id) -> batch_id | none`
    /// (spec.md §4.7).
    pub async fn create_batch(
        &self,
        config: &BatchConfiguration,
        worker_id: &str,
        correlation_id: Option<&str>,
    ) -> Result<Option<String>, PlannerError> {
        self.create_batch_filtered(config, worker_id, correlation_id, &ArticleFilter::default()).await
    }

    /// As [`Self::create_batch`], narrowed to a specific set of article ids
    /// and/or a single feed domain -- used by manual/operational batch
    /// creation (the CLI's `process-articles --article-id`/`--source-domain`),
    /// never by the scheduler's routine loop.
    pub async fn create_batch_filtered(
        &self,
        config: &BatchConfiguration,
        worker_id: &str,
        correlation_id: Option<&str>,
        filter: &ArticleFilter,
    ) -> Result<Option<String>, PlannerError> {
        let started = std::time::Instant::now();

        let lock_status = self
            .locks
            .acquire_lock(
                BATCH_CREATION_LOCK_KEY,
                worker_id,
                Some(Duration::from_secs(30)),
                LockType::Exclusive,
                false,
                serde_json::json!({}),
            )
            .await?;

        if !matches!(lock_status, LockStatus::Acquired | LockStatus::Renewed) {
            debug!(worker_id, "failed to acquire batch creation lock");
            self.incr("batch.creation.lock_failed");
            return Ok(None);
        }

        let result = self.create_batch_locked(config, worker_id, correlation_id, started, filter).await;

        if let Err(release_err) = self.locks.release_lock(BATCH_CREATION_LOCK_KEY, worker_id).await {
            warn!(error = %release_err, "failed to release batch creation lock");
        }

        result
    }

    async fn create_batch_locked(
        &self,
        config: &BatchConfiguration,
        worker_id: &str,
        correlation_id: Option<&str>,
        started: std::time::Instant,
        filter: &ArticleFilter,
    ) -> Result<Option<String>, PlannerError> {
        let load_metrics = self.sample_load_metrics().await?;
        let load_factor = load_metrics.load_factor(self.error_rate_weight);
        let optimal_size = calculate_optimal_batch_size(config, load_factor, &self.sizing_history);

        let mut redis = self.redis.clone();
        let candidates = crate::selection::select_batch_candidates_filtered(
            &self.pool, &mut redis, optimal_size, config, filter,
        )
        .await?;
        let candidates = self.filter_unhealthy_feeds(candidates).await;

        if candidates.is_empty() {
            info!("no suitable articles found for batch creation");
            self.incr("batch.creation.no_candidates");
            return Ok(None);
        }

        let batch_id = self.create_batch_record(&candidates, config, worker_id, correlation_id, &load_metrics).await?;
        self.lock_articles(&candidates, &batch_id).await?;

        if let Some(m) = &self.metrics {
            let mut tags = empty_tags();
            tags.insert("worker_id".into(), worker_id.to_string());
            m.timing("batch.creation.duration", started.elapsed().as_secs_f64(), tags.clone());
            m.histogram("batch.size", candidates.len() as f64, tags.clone());
            m.gauge("batch.load_factor", load_factor, tags);
        }

        info!(batch_id, articles = candidates.len(), worker_id, "created batch");
        Ok(Some(batch_id))
    }

    async fn create_batch_record(
        &self,
        candidates: &[crate::candidate::BatchCandidate],
        config: &BatchConfiguration,
        worker_id: &str,
        correlation_id: Option<&str>,
        load_metrics: &LoadMetrics,
    ) -> Result<String, PlannerError> {
        let now = Utc::now();
        let suffix: String = {
            let mut rng = rand::thread_rng();
            (0..8).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
        };
        let batch_id = format!("batch_{}_{}", now.timestamp(), suffix);
        let correlation_id = correlation_id.map(str::to_string).unwrap_or_else(|| {
            let mut rng = rand::thread_rng();
            let hex: String = (0..16).map(|_| format!("{:x}", rng.gen_range(0..16))).collect();
            format!("corr_{hex}")
        });

        let total_estimated_ms: i64 = candidates.iter().map(|c| c.estimated_processing_time_ms).sum();
        let avg_priority_score = candidates.iter().map(|c| c.priority_score).sum::<f64>() / candidates.len() as f64;
        let retry_articles = candidates.iter().filter(|c| c.is_retry()).count();
        let domain_count = candidates.iter().map(|c| c.domain.as_str()).collect::<std::collections::HashSet<_>>().len();

        let canonical = config.canonical_json().to_string();
        let config_hash_value = config_hash(&canonical);

        let processing_config = serde_json::json!({
            "target_size": config.target_size,
            "actual_size": candidates.len(),
            "avg_priority_score": avg_priority_score,
            "retry_articles_count": retry_articles,
            "retry_articles_percent": retry_articles as f64 / candidates.len() as f64 * 100.0,
            "load_factor": load_metrics.load_factor(self.error_rate_weight),
            "diversity_domains": domain_count,
            "estimated_total_time_ms": total_estimated_ms,
        });

        let estimated_completion = now
            + chrono::Duration::milliseconds(total_estimated_ms / (load_metrics.active_workers.max(1)));

        sqlx::query(
            "INSERT INTO batches (
                batch_id, batch_size, articles_total, status, current_stage,
                priority, worker_id, correlation_id, idempotency_key,
                estimated_completion, processing_config, config_hash,
                processing_version, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())",
        )
        .bind(&batch_id)
        .bind(candidates.len() as i32)
        .bind(candidates.len() as i32)
        .bind("ready")
        .bind("ready")
        .bind(priority_value(config.priority))
        .bind(worker_id)
        .bind(&correlation_id)
        .bind(format!("{batch_id}_{worker_id}"))
        .bind(estimated_completion)
        .bind(processing_config)
        .bind(&config_hash_value)
        .bind("1.0")
        .execute(&self.pool)
        .await?;

        Ok(batch_id)
    }

    async fn lock_articles(
        &self,
        candidates: &[crate::candidate::BatchCandidate],
        batch_id: &str,
    ) -> Result<(), PlannerError> {
        let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
        let lease_seconds = ARTICLE_LEASE.as_secs() as f64;

        let result = sqlx::query(
            "UPDATE raw_articles SET
                status = 'processing',
                batch_id = $1,
                lock_owner = $1,
                lock_acquired_at = NOW(),
                lock_expires_at = NOW() + ($3 * INTERVAL '1 second'),
                updated_at = NOW()
             WHERE id = ANY($2::bigint[])
               AND status = 'pending'
               AND lock_owner IS NULL",
        )
        .bind(batch_id)
        .bind(&ids)
        .bind(lease_seconds)
        .execute(&self.pool)
        .await?;

        let locked = result.rows_affected() as usize;
        if locked != candidates.len() {
            warn!(locked, requested = candidates.len(), batch_id, "only locked a subset of selected articles");
            sqlx::query("UPDATE batches SET articles_total = $1, batch_size = $1 WHERE batch_id = $2")
                .bind(locked as i32)
                .bind(batch_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Defense-in-depth pass over the SQL-selected candidates: drop any
    /// whose feed fails the §4.6 `is_healthy` gate by the time the cache is
    /// consulted, memoizing per feed so a batch with many articles from the
    /// same domain only costs one lookup per feed.
    async fn filter_unhealthy_feeds(
        &self,
        candidates: Vec<crate::candidate::BatchCandidate>,
    ) -> Vec<crate::candidate::BatchCandidate> {
        let mut verdicts = std::collections::HashMap::new();
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let healthy = match verdicts.get(&candidate.feed_id) {
                Some(&healthy) => healthy,
                None => {
                    let healthy = match self.health_cache.get(candidate.feed_id).await {
                        Ok(metrics) => metrics.is_healthy(),
                        Err(_) => false,
                    };
                    verdicts.insert(candidate.feed_id, healthy);
                    healthy
                }
            };

            if healthy {
                kept.push(candidate);
            }
        }

        kept
    }

    async fn sample_load_metrics(&self) -> Result<LoadMetrics, PlannerError> {
        let active_workers: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT worker_id) FROM batches WHERE status = 'processing'")
                .fetch_one(&self.pool)
                .await?;
        let queue_depth: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_articles WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        let avg_batch_time: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(EXTRACT(EPOCH FROM (completed_at - started_at)))
             FROM batches WHERE completed_at IS NOT NULL AND started_at > NOW() - INTERVAL '1 hour'",
        )
        .fetch_one(&self.pool)
        .await?;
        let error_rate: Option<f64> = sqlx::query_scalar(
            "SELECT COALESCE((SUM(articles_failed)::float8 / NULLIF(SUM(articles_total), 0)), 0)
             FROM batches WHERE created_at > NOW() - INTERVAL '1 hour'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LoadMetrics {
            active_workers,
            avg_batch_time_seconds: avg_batch_time.unwrap_or(0.0),
            queue_depth,
            error_rate_1h: error_rate.unwrap_or(0.0),
            memory_usage_percent: 0.0,
            cpu_usage_percent: 0.0,
            disk_io_wait_percent: 0.0,
        })
    }

    /// Reset articles whose lease expired before the batch finished, mark
    /// orphaned batches failed, and sweep expired distributed-lock rows
    /// (spec.md §4.7 `cleanup_expired_locks`, shared with the lock crate's
    /// KV/PG sweep).
    pub async fn cleanup_expired_locks(&self) -> Result<u64, PlannerError> {
        let reset_count: i64 = sqlx::query_scalar(
            "WITH expired_articles AS (
                UPDATE raw_articles SET
                    status = 'pending', batch_id = NULL, lock_owner = NULL,
                    lock_acquired_at = NULL, lock_expires_at = NULL, updated_at = NOW()
                WHERE lock_expires_at < NOW() AND lock_owner IS NOT NULL
                RETURNING id
            )
            SELECT COUNT(*) FROM expired_articles",
        )
        .fetch_one(&self.pool)
        .await?;

        self.locks.cleanup_expired_locks().await?;

        sqlx::query(
            "UPDATE batches SET status = 'failed', completed_at = NOW(), updated_at = NOW()
             WHERE status IN ('processing', 'ready')
               AND (started_at IS NULL OR started_at < NOW() - INTERVAL '4 hours')
               AND NOT EXISTS (
                   SELECT 1 FROM raw_articles
                   WHERE batch_id = batches.batch_id AND lock_owner IS NOT NULL
               )",
        )
        .execute(&self.pool)
        .await?;

        if reset_count > 0 {
            info!(reset_count, "reset articles with expired locks");
            if let Some(m) = &self.metrics {
                m.incr("locks.expired_cleaned", reset_count as f64, empty_tags());
            }
        }

        Ok(reset_count as u64)
    }

    /// `get_batch_queue_status` -- operational snapshot of queue depth and
    /// batch-status distribution over the last 24h.
    pub async fn queue_status(&self) -> Result<BatchQueueStatus, PlannerError> {
        let stats = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_articles,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing_articles,
                COUNT(DISTINCT batch_id) FILTER (WHERE batch_id IS NOT NULL) AS active_batches,
                COUNT(DISTINCT lock_owner) FILTER (WHERE lock_owner IS NOT NULL) AS active_workers,
                AVG(EXTRACT(EPOCH FROM (NOW() - fetched_at))) FILTER (WHERE status = 'pending') AS avg_queue_age_seconds
             FROM raw_articles WHERE fetched_at > NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;

        let batch_rows = sqlx::query(
            "SELECT status, COUNT(*) AS count, AVG(articles_total) AS avg_size,
                    AVG(EXTRACT(EPOCH FROM (NOW() - created_at))) AS avg_age_seconds
             FROM batches WHERE created_at > NOW() - INTERVAL '24 hours'
             GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let avg_queue_age_seconds: Option<f64> = stats.try_get("avg_queue_age_seconds")?;
        let batch_status_distribution = batch_rows
            .into_iter()
            .map(|row| {
                let avg_size: Option<f64> = row.try_get("avg_size")?;
                let avg_age_seconds: Option<f64> = row.try_get("avg_age_seconds")?;
                Ok(BatchStatusBucket {
                    status: row.try_get("status")?,
                    count: row.try_get("count")?,
                    avg_size: avg_size.unwrap_or(0.0),
                    avg_age_hours: avg_age_seconds.unwrap_or(0.0) / 3600.0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(BatchQueueStatus {
            pending_articles: stats.try_get("pending_articles")?,
            processing_articles: stats.try_get("processing_articles")?,
            active_batches: stats.try_get("active_batches")?,
            active_workers: stats.try_get("active_workers")?,
            avg_queue_age_hours: avg_queue_age_seconds.unwrap_or(0.0) / 3600.0,
            batch_status_distribution,
        })
    }

    /// Feed a completed batch's outcome back into the adaptive-sizing
    /// history used by `calculate_optimal_batch_size`.
    pub fn record_batch_outcome(&self, success_rate: f64, batch_size: u32, load_factor: f64) {
        self.sizing_history.record(load_factor, batch_size, success_rate);
        if let Some(m) = &self.metrics {
            let tags = empty_tags();
            m.histogram("batch.success_rate", success_rate, tags.clone());
            m.histogram("batch.size_actual", batch_size as f64, tags);
        }
    }

    fn incr(&self, name: &str) {
        if let Some(m) = &self.metrics {
            m.incr(name, 1.0, empty_tags());
        }
    }
}

fn priority_value(priority: BatchPriority) -> i32 {
    match priority {
        BatchPriority::Critical => 1,
        BatchPriority::High => 2,
        BatchPriority::Normal => 3,
        BatchPriority::Low => 4,
        BatchPriority::Background => 5,
    }
}

/// Small, fresh-only, high-priority batch for urgent processing.
pub async fn create_emergency_batch(
    planner: &BatchPlanner,
    worker_id: &str,
    max_size: u32,
) -> Result<Option<String>, PlannerError> {
    let config = BatchConfiguration {
        target_size: max_size,
        min_size: 10,
        max_size,
        priority: BatchPriority::Critical,
        max_age_hours: 1.0,
        min_quality_score: 0.7,
        max_retry_articles_percent: 30.0,
        diversity_factor: 0.5,
    };
    planner.create_batch(&config, worker_id, Some(&format!("emergency_{}", Utc::now().timestamp()))).await
}

/// Batch geared toward old/retry articles that the main loop deprioritizes.
pub async fn create_cleanup_batch(
    planner: &BatchPlanner,
    worker_id: &str,
    max_age_hours: f64,
) -> Result<Option<String>, PlannerError> {
    let config = BatchConfiguration {
        target_size: 100,
        min_size: 50,
        max_size: 150,
        priority: BatchPriority::Low,
        max_age_hours,
        min_quality_score: 0.2,
        max_retry_articles_percent: 80.0,
        diversity_factor: 0.1,
    };
    planner.create_batch(&config, worker_id, Some(&format!("cleanup_{}", Utc::now().timestamp()))).await
}
