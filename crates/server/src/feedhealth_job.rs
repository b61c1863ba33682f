//! `feed_health_check` RPC (spec.md §6): recomputes each feed's rolling
//! 24h error/duplicate rates and `health_score` from `raw_articles`, the
//! periodic job `feedline_feedhealth::FeedHealthCache`'s doc comment refers
//! to as keeping the cached scores from drifting.

use chrono::Utc;
use sqlx::{PgPool, Row};

use feedline_feedhealth::FeedHealthCache;

pub struct FeedHealthCheckResult {
    pub updated_feeds: u64,
    pub checked_at: chrono::DateTime<Utc>,
}

/// Recomputes health scores for `feed_ids`, or every active feed when none
/// are given, and invalidates the cache entries that changed.
pub async fn run_feed_health_check(
    pool: &PgPool,
    cache: &FeedHealthCache,
    feed_ids: Option<&[i64]>,
) -> Result<FeedHealthCheckResult, sqlx::Error> {
    let rows = match feed_ids {
        Some(ids) => {
            sqlx::query(
                "SELECT id FROM feeds WHERE status = 'active' AND id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(pool)
            .await?
        }
        None => sqlx::query("SELECT id FROM feeds WHERE status = 'active'").fetch_all(pool).await?,
    };

    let mut updated = 0u64;
    for row in rows {
        let feed_id: i64 = row.try_get("id")?;
        if recompute_one(pool, feed_id).await? {
            cache.invalidate(feed_id);
            updated += 1;
        }
    }

    Ok(FeedHealthCheckResult { updated_feeds: updated, checked_at: Utc::now() })
}

/// Recomputes one feed's rolling rates from the last 24h of `raw_articles`
/// and derives a new `health_score` -- `100` minus penalties mirroring
/// `FeedHealthMetrics::priority_score`'s error/duplicate/failure terms, so
/// the cached score and the freshly-persisted one stay consistent.
async fn recompute_one(pool: &PgPool, feed_id: i64) -> Result<bool, sqlx::Error> {
    let stats = sqlx::query(
        "SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status IN ('rejected', 'failed')) AS failed,
            COUNT(*) FILTER (WHERE status = 'duplicate') AS duplicate
         FROM raw_articles WHERE feed_id = $1 AND fetched_at > NOW() - INTERVAL '24 hours'",
    )
    .bind(feed_id)
    .fetch_one(pool)
    .await?;

    let total: i64 = stats.try_get("total")?;
    let failed: i64 = stats.try_get("failed")?;
    let duplicate: i64 = stats.try_get("duplicate")?;

    if total == 0 {
        return Ok(false);
    }

    let error_rate = failed as f64 / total as f64;
    let duplicate_rate = duplicate as f64 / total as f64;
    let error_penalty = (error_rate * 1000.0).min(50.0);
    let dup_penalty = (duplicate_rate * 50.0).min(25.0);
    let health_score = (100.0 - error_penalty - dup_penalty).clamp(0.0, 100.0) as i32;

    sqlx::query(
        "UPDATE feeds SET
            error_rate_24h = $2,
            duplicate_rate_24h = $3,
            health_score = $4,
            consecutive_failures = CASE WHEN $5 > 0 THEN consecutive_failures + 1 ELSE 0 END
         WHERE id = $1",
    )
    .bind(feed_id)
    .bind(error_rate)
    .bind(duplicate_rate)
    .bind(health_score)
    .bind(failed)
    .execute(pool)
    .await?;

    Ok(true)
}
