use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use feedline_core::entities::{Feed, FeedStatus};
use sqlx::PgPool;
use sqlx::Row;

use crate::error::FeedHealthError;
use crate::scoring::FeedHealthMetrics;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry {
    metrics: FeedHealthMetrics,
    expires_at: Instant,
}

/// Feed health cache keyed by `feed_id` (spec.md §4.6). Misses load from
/// the database restricted to `status = active`; entries expire after
/// `ttl` (default ~5 minutes).
pub struct FeedHealthCache {
    pool: PgPool,
    ttl: Duration,
    entries: Mutex<HashMap<i64, Entry>>,
}

impl FeedHealthCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ttl: DEFAULT_TTL, entries: Mutex::new(HashMap::new()) }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn get(&self, feed_id: i64) -> Result<FeedHealthMetrics, FeedHealthError> {
        if let Some(hit) = self.cached(feed_id) {
            return Ok(hit);
        }
        let metrics = self.load_from_db(feed_id).await?;
        self.entries.lock().unwrap().insert(
            feed_id,
            Entry { metrics: metrics.clone(), expires_at: Instant::now() + self.ttl },
        );
        Ok(metrics)
    }

    pub fn invalidate(&self, feed_id: i64) {
        self.entries.lock().unwrap().remove(&feed_id);
    }

    fn cached(&self, feed_id: i64) -> Option<FeedHealthMetrics> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&feed_id)?;
        if entry.expires_at > Instant::now() {
            Some(entry.metrics.clone())
        } else {
            None
        }
    }

    async fn load_from_db(&self, feed_id: i64) -> Result<FeedHealthMetrics, FeedHealthError> {
        let row = sqlx::query(
            "SELECT id, domain, trust_score, health_score, daily_quota, daily_processed, \
                    error_rate_24h, duplicate_rate_24h, consecutive_failures, status, \
                    avg_response_time_ms, content_quality_score, last_success \
             FROM feeds WHERE id = $1 AND status = 'active'",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(FeedHealthError::NotFound(feed_id))?;

        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "paused" => FeedStatus::Paused,
            "disabled" => FeedStatus::Disabled,
            _ => FeedStatus::Active,
        };

        let feed = Feed {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            trust_score: row.try_get("trust_score")?,
            health_score: row.try_get("health_score")?,
            daily_quota: row.try_get("daily_quota")?,
            daily_processed: row.try_get("daily_processed")?,
            error_rate_24h: row.try_get("error_rate_24h")?,
            duplicate_rate_24h: row.try_get("duplicate_rate_24h")?,
            consecutive_failures: row.try_get("consecutive_failures")?,
            status,
        };

        Ok(FeedHealthMetrics {
            feed,
            avg_response_time_ms: row.try_get("avg_response_time_ms")?,
            content_quality_score: row.try_get("content_quality_score")?,
            last_success: row.try_get("last_success")?,
        })
    }
}
