use async_trait::async_trait;
use feedline_metrics::{empty_tags, MetricsSink};
use sqlx::PgPool;
use tracing::warn;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

/// Stage 7 (spec.md §4.9): refreshes the `articles_index.search_vector`
/// tsvector, sanity-checks chunk vectors, and marks indexing complete.
pub struct SearchIndexingStage {
    pub pool: PgPool,
    pub metrics: Option<MetricsSink>,
}

#[async_trait]
impl Stage for SearchIndexingStage {
    fn name(&self) -> &'static str {
        "stage_7_search_indexing"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut errors = 0;

        for article in articles {
            if let Err(e) = self.update_search_vector(article.id).await {
                let mut article = article;
                article.add_error(self.name(), "search_vector_update_failed", e.to_string());
                errors += 1;
                survivors.push(article);
                continue;
            }

            self.warn_on_missing_chunk_vectors(article.id).await?;

            if let Some(m) = &self.metrics {
                let lang = article.language_detected.clone().unwrap_or_else(|| "unknown".to_string());
                m.gauge(&format!("search.articles_indexed.{lang}"), 1.0, empty_tags());
            }

            self.mark_indexed(article.id).await?;
            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, 0, errors))
    }
}

impl SearchIndexingStage {
    async fn update_search_vector(&self, raw_article_id: i64) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE articles_index SET \
                search_vector = \
                    setweight(to_tsvector(coalesce(language, 'english')::regconfig, coalesce(title_norm, '')), 'A') || \
                    setweight(to_tsvector(coalesce(language, 'english')::regconfig, coalesce(clean_text, '')), 'B') || \
                    setweight(to_tsvector(coalesce(language, 'english')::regconfig, array_to_string(coalesce(tags, '{}'), ' ')), 'C') || \
                    setweight(to_tsvector(coalesce(language, 'english')::regconfig, array_to_string(coalesce(keywords, '{}'), ' ')), 'D'), \
                updated_at = NOW() \
             WHERE raw_article_id = $1",
        )
        .bind(raw_article_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn warn_on_missing_chunk_vectors(&self, raw_article_id: i64) -> Result<(), PipelineError> {
        let missing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM article_chunks ac \
             JOIN articles_index ai ON ac.article_id = ai.article_id \
             WHERE ai.raw_article_id = $1 AND ac.text_clean = ''",
        )
        .bind(raw_article_id)
        .fetch_one(&self.pool)
        .await?;

        if missing > 0 {
            warn!(raw_article_id, missing, "chunks with empty search text");
        }
        Ok(())
    }

    async fn mark_indexed(&self, raw_article_id: i64) -> Result<(), PipelineError> {
        sqlx::query("UPDATE articles_index SET indexing_completed = TRUE, updated_at = NOW() WHERE raw_article_id = $1")
            .bind(raw_article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
