use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tracing::warn;

use crate::candidate::BatchCandidate;
use crate::error::PlannerError;
use crate::feed_breaker;
use crate::types::BatchConfiguration;

/// Narrows selection to explicit article ids and/or a single feed domain,
/// used by the CLI's `process-articles --article-id`/`--source-domain`
/// flags. Neither field is consulted by the scheduler's routine batch
/// creation.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub article_ids: Option<Vec<i64>>,
    pub source_domain: Option<String>,
}

/// `feed_priorities` tiers by trust score; ties at the SQL level with
/// `priority_score DESC, fetched_at ASC` decide order within a tier.
const SELECTION_QUERY: &str = r#"
WITH feed_priorities AS (
    SELECT
        f.id,
        f.domain,
        f.trust_score,
        f.health_score,
        f.daily_quota,
        f.daily_processed,
        CASE
            WHEN f.trust_score >= 90 THEN 1
            WHEN f.trust_score >= 70 THEN 2
            WHEN f.trust_score >= 50 THEN 3
            ELSE 4
        END AS priority_tier
    FROM feeds f
    WHERE f.status = 'active'
      AND f.health_score >= $1
),
article_candidates AS (
    SELECT
        ra.id,
        ra.feed_id,
        ra.url,
        ra.url_hash,
        ra.text_hash,
        ra.title,
        ra.fetched_at,
        ra.retry_count,
        fp.domain,
        fp.priority_tier,
        (
            fp.trust_score::double precision * 0.4 +
            fp.health_score::double precision * 0.3 +
            CASE
                WHEN ra.retry_count = 0 THEN 20.0
                WHEN ra.retry_count = 1 THEN 10.0
                ELSE -ra.retry_count::double precision * 5.0
            END +
            GREATEST(0.0, 30.0 - EXTRACT(EPOCH FROM (NOW() - ra.fetched_at)) / 3600.0) +
            CASE WHEN ra.fetched_at > NOW() - INTERVAL '2 hours' THEN 15.0 ELSE 0.0 END
        ) AS priority_score,
        CASE
            WHEN LENGTH(ra.title) > 200 OR LENGTH(ra.content) > 50000 THEN 2000::bigint
            WHEN ra.retry_count > 1 THEN 1500::bigint
            ELSE 1000::bigint
        END AS estimated_processing_time_ms,
        ROW_NUMBER() OVER (
            PARTITION BY fp.domain
            ORDER BY (
                fp.trust_score::double precision * 0.4 +
                fp.health_score::double precision * 0.3 +
                CASE
                    WHEN ra.retry_count = 0 THEN 20.0
                    WHEN ra.retry_count = 1 THEN 10.0
                    ELSE -ra.retry_count::double precision * 5.0
                END +
                GREATEST(0.0, 30.0 - EXTRACT(EPOCH FROM (NOW() - ra.fetched_at)) / 3600.0) +
                CASE WHEN ra.fetched_at > NOW() - INTERVAL '2 hours' THEN 15.0 ELSE 0.0 END
            ) DESC,
            ra.fetched_at ASC
        ) AS domain_rank
    FROM raw_articles ra
    JOIN feed_priorities fp ON ra.feed_id = fp.id
    WHERE ra.status = 'pending'
      AND ra.lock_owner IS NULL
      AND ra.fetched_at > NOW() - ($2::double precision * INTERVAL '1 hour')
      AND (fp.daily_quota = 0 OR fp.daily_processed < fp.daily_quota * 0.95)
      AND ($5::bigint[] IS NULL OR ra.id = ANY($5))
      AND ($6::text IS NULL OR fp.domain = $6)
),
selected AS (
    SELECT id, feed_id, url, url_hash, text_hash, title, fetched_at, retry_count,
           priority_score, estimated_processing_time_ms, domain, priority_tier
    FROM article_candidates
    WHERE domain_rank <= $3
    ORDER BY priority_tier ASC, priority_score DESC, fetched_at ASC
    LIMIT $4
)
-- window functions can't coexist with FOR UPDATE in the same query, so the
-- rank/order happens in `selected` and this final join just takes the lock.
SELECT ra.id, ra.feed_id, ra.url, ra.url_hash, ra.text_hash, ra.title, ra.fetched_at,
       ra.retry_count, selected.priority_score, selected.estimated_processing_time_ms,
       selected.domain, selected.priority_tier
FROM raw_articles ra
JOIN selected ON selected.id = ra.id
ORDER BY selected.priority_tier ASC, selected.priority_score DESC, selected.fetched_at ASC
FOR UPDATE OF ra SKIP LOCKED
"#;

/// Select and filter batch candidates (spec.md §4.7 steps 4-5). The SQL does
/// the heavy lifting (health/quota gating, per-domain ranking, ordering);
/// this applies the retry-percentage cap, the domain diversity cap, and the
/// circuit-breaker skip, stopping once `target_size` is reached.
pub async fn select_batch_candidates(
    pool: &PgPool,
    redis: &mut redis::aio::ConnectionManager,
    target_size: u32,
    config: &BatchConfiguration,
) -> Result<Vec<BatchCandidate>, PlannerError> {
    select_batch_candidates_filtered(pool, redis, target_size, config, &ArticleFilter::default()).await
}

/// As [`select_batch_candidates`], additionally narrowed by `filter`.
pub async fn select_batch_candidates_filtered(
    pool: &PgPool,
    redis: &mut redis::aio::ConnectionManager,
    target_size: u32,
    config: &BatchConfiguration,
    filter: &ArticleFilter,
) -> Result<Vec<BatchCandidate>, PlannerError> {
    let min_health_score = config.min_quality_score * 100.0;
    let max_per_domain = (target_size as f64 * config.diversity_factor).floor().max(1.0) as i64;
    let fetch_limit = (target_size as f64 * 1.5).ceil() as i64;

    let rows = sqlx::query(SELECTION_QUERY)
        .bind(min_health_score)
        .bind(config.max_age_hours)
        .bind(max_per_domain)
        .bind(fetch_limit)
        .bind(filter.article_ids.as_deref())
        .bind(filter.source_domain.as_deref())
        .fetch_all(pool)
        .await?;

    let mut candidates = Vec::new();
    let mut domain_counts: HashMap<String, i64> = HashMap::new();
    let mut retry_count: u32 = 0;

    for row in rows {
        let feed_id: i64 = row.try_get("feed_id")?;
        let domain: String = row.try_get("domain")?;
        let this_retry_count: i32 = row.try_get("retry_count")?;

        if this_retry_count > 0 {
            let prospective_retry = retry_count + 1;
            let denom = if candidates.is_empty() { 1 } else { candidates.len() };
            let retry_percent = prospective_retry as f64 / denom as f64 * 100.0;
            if retry_percent > config.max_retry_articles_percent {
                continue;
            }
            retry_count = prospective_retry;
        }

        if *domain_counts.get(&domain).unwrap_or(&0) >= max_per_domain {
            continue;
        }

        if feed_breaker::is_open(redis, feed_id).await {
            continue;
        }

        candidates.push(BatchCandidate {
            id: row.try_get("id")?,
            feed_id,
            url: row.try_get("url")?,
            url_hash: row.try_get("url_hash")?,
            text_hash: row.try_get("text_hash")?,
            title: row.try_get("title")?,
            domain: domain.clone(),
            fetched_at: row.try_get("fetched_at")?,
            retry_count: this_retry_count,
            priority_score: row.try_get("priority_score")?,
            priority_tier: row.try_get("priority_tier")?,
            estimated_processing_time_ms: row.try_get("estimated_processing_time_ms")?,
        });
        *domain_counts.entry(domain).or_insert(0) += 1;

        if candidates.len() as u32 >= target_size {
            break;
        }
    }

    if (candidates.len() as u32) < target_size {
        warn!(
            selected = candidates.len(),
            target = target_size,
            domains = domain_counts.len(),
            retry_count,
            "batch candidate selection fell short of target size"
        );
    }

    Ok(candidates)
}
