use std::sync::Arc;

use async_trait::async_trait;
use feedline_core::error::RejectionReason;
use feedline_feedhealth::FeedHealthCache;
use redis::AsyncCommands;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

const BLACKLIST_KEY: &str = "blacklisted_domains";

/// Stage 1 (spec.md §4.9): feed quota/trust/health gate plus the
/// domain-blacklist check. `Feed` carries no blacklist flag of its own, so
/// blacklisting is looked up separately in the shared domain-blacklist set.
pub struct FeedHealthStage {
    pub cache: Arc<FeedHealthCache>,
    pub redis: redis::aio::ConnectionManager,
}

#[async_trait]
impl Stage for FeedHealthStage {
    fn name(&self) -> &'static str {
        "stage_1_feed_health"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut rejected = 0;
        let mut errors = 0;

        for mut article in articles {
            let metrics = match self.cache.get(article.feed_id).await {
                Ok(m) => m,
                Err(_) => {
                    article.add_error(self.name(), "feed_health_lookup_failed", "feed not found or inactive");
                    article.set_rejected(RejectionReason::FeedQuotaExceeded);
                    errors += 1;
                    rejected += 1;
                    continue;
                }
            };

            article.feed_domain = metrics.feed.domain.clone();
            article.feed_trust_score = metrics.feed.trust_score as f64;
            article.feed_health_score = metrics.feed.health_score as f64;

            if is_blacklisted(&mut self.redis.clone(), &metrics.feed.domain).await {
                article.set_rejected(RejectionReason::DomainBlacklisted);
                rejected += 1;
                continue;
            }

            if !metrics.feed.has_quota_remaining() {
                article.set_rejected(RejectionReason::FeedQuotaExceeded);
                rejected += 1;
                continue;
            }

            if !metrics.is_healthy() {
                article.set_rejected(RejectionReason::LowQuality);
                rejected += 1;
                continue;
            }

            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, rejected, errors))
    }
}

async fn is_blacklisted(conn: &mut redis::aio::ConnectionManager, domain: &str) -> bool {
    conn.sismember::<_, _, bool>(BLACKLIST_KEY, domain).await.unwrap_or(false)
}
