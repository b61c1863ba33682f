use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feedline_core::error::RejectionReason;
use feedline_core::hashing::sha256_hex;
use sqlx::{PgPool, Row};

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

struct ExistingArticle {
    article_id: String,
}

/// Stage 2 (spec.md §4.9): URL-hash and text-hash deduplication against
/// `articles_index`, scoped to `dedup_window_days`.
pub struct DeduplicationStage {
    pub pool: PgPool,
    pub dedup_window_days: i64,
}

#[async_trait]
impl Stage for DeduplicationStage {
    fn name(&self) -> &'static str {
        "stage_2_deduplication"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let url_hashes: Vec<String> = articles.iter().map(|a| a.url_hash.clone()).collect();
        let existing = self.existing_by_url_hash(&url_hashes).await?;

        let mut survivors = Vec::with_capacity(articles.len());
        let mut rejected = 0;
        let errors = 0;

        for mut article in articles {
            if let Some(ea) = existing.get(&article.url_hash) {
                article.set_duplicate(RejectionReason::DuplicateUrl, ea.article_id.clone(), 1.0);
                rejected += 1;
                continue;
            }

            if let Some(content) = article.content.clone() {
                article.text_hash = Some(sha256_hex(&content));
            }

            if let Some(text_hash) = article.text_hash.clone() {
                if let Some(ea) = self.find_content_duplicate(&text_hash, article.id).await? {
                    article.set_duplicate(RejectionReason::DuplicateContent, ea.article_id, 1.0);
                    rejected += 1;
                    continue;
                }
            }

            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, rejected, errors))
    }
}

impl DeduplicationStage {
    async fn existing_by_url_hash(&self, url_hashes: &[String]) -> Result<HashMap<String, ExistingArticle>, PipelineError> {
        if url_hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let cutoff = Utc::now() - ChronoDuration::days(self.dedup_window_days);
        let rows = sqlx::query(
            "SELECT article_id, url_hash FROM articles_index \
             WHERE url_hash = ANY($1) AND created_at >= $2",
        )
        .bind(url_hashes)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            let url_hash: String = row.try_get("url_hash")?;
            let article_id: String = row.try_get("article_id")?;
            map.insert(url_hash, ExistingArticle { article_id });
        }
        Ok(map)
    }

    async fn find_content_duplicate(&self, text_hash: &str, raw_article_id: i64) -> Result<Option<ExistingArticle>, PipelineError> {
        let cutoff = Utc::now() - ChronoDuration::days(self.dedup_window_days);
        let row = sqlx::query(
            "SELECT article_id FROM articles_index \
             WHERE text_hash = $1 AND raw_article_id != $2 AND created_at >= $3 \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(text_hash)
        .bind(raw_article_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(ExistingArticle { article_id: r.try_get("article_id")? }),
            None => None,
        })
    }
}
