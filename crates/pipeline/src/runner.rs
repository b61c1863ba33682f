use feedline_core::config::PipelineConfig;
use feedline_core::entities::ArticleStatus;
use feedline_feedhealth::FeedHealthCache;
use feedline_idempotency::IdempotencyStore;
use feedline_metrics::{empty_tags, MetricsSink};
use feedline_state::StateManager;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};

use crate::article::{ErrorEntry, PipelineArticle};
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{run_stage, Stage};
use crate::stages::{
    ChunkingStage, DeduplicationStage, DiagnosticsStage, FeedHealthStage, IndexingStage, NormalizationStage,
    SearchIndexingStage, TextCleaningStage, ValidationStage,
};

/// Outcome of a single `process_batch` call (spec.md §6's `process_batch` RPC).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResult {
    pub success: bool,
    pub batch_id: String,
    pub articles_processed: usize,
    pub articles_successful: usize,
    pub processing_time_seconds: f64,
}

/// Drives a batch through all 9 pipeline stages in order (spec.md §4.9's
/// Runner protocol). Stops early if a stage leaves no survivors; on a stage
/// error the batch is marked failed and the error propagated.
pub struct PipelineRunner {
    pool: PgPool,
    redis: redis::aio::ConnectionManager,
    config: PipelineConfig,
    health_cache: std::sync::Arc<FeedHealthCache>,
    state: std::sync::Arc<StateManager>,
    idempotency: std::sync::Arc<IdempotencyStore>,
    metrics: Option<MetricsSink>,
}

impl PipelineRunner {
    pub fn new(
        pool: PgPool,
        redis: redis::aio::ConnectionManager,
        config: PipelineConfig,
        state: std::sync::Arc<StateManager>,
        idempotency: std::sync::Arc<IdempotencyStore>,
    ) -> Self {
        let health_cache = std::sync::Arc::new(FeedHealthCache::new(pool.clone()));
        Self { pool, redis, config, health_cache, state, idempotency, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs a batch through all 9 stages (spec.md §6's `process_batch` RPC).
    /// Delivery of the underlying task is at-least-once, so this first
    /// consults the Idempotency Store (spec.md §4.3/§4.10): a prior
    /// completed run for the same `batch_id` returns its cached result
    /// instead of reprocessing.
    pub async fn process_batch(&self, batch_id: &str, worker_id: &str) -> Result<BatchResult, PipelineError> {
        let idempotency_key = format!("process_batch:{batch_id}");

        if let Some(cached) = self.idempotency.is_completed(&idempotency_key).await? {
            if let Ok(result) = serde_json::from_value::<BatchResult>(cached) {
                info!(batch_id, "process_batch already completed, returning cached result");
                return Ok(result);
            }
        }

        if self.idempotency.mark_in_progress(&idempotency_key, serde_json::json!({"worker_id": worker_id}), None).await?
            == feedline_idempotency::ClaimOutcome::AlreadyInProgress
        {
            warn!(batch_id, "process_batch already in progress elsewhere");
            return Err(PipelineError::Stage { stage: "process_batch", message: "already in progress".to_string() });
        }

        let result = self.process_batch_inner(batch_id, worker_id).await;

        match &result {
            Ok(batch_result) => {
                let payload = serde_json::to_value(batch_result).unwrap_or(serde_json::Value::Null);
                self.idempotency.mark_completed(&idempotency_key, &payload, None).await?;
            }
            Err(_) => {
                self.idempotency.clear_progress(&idempotency_key).await?;
            }
        }

        result
    }

    async fn process_batch_inner(&self, batch_id: &str, worker_id: &str) -> Result<BatchResult, PipelineError> {
        let started = std::time::Instant::now();
        let articles = self.load_batch_articles(batch_id).await?;
        let input_count = articles.len();

        let mut context = ProcessingContext::new(batch_id, worker_id, format!("corr_{batch_id}"));

        let result = self.run_stages(articles, &mut context).await;

        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(survivors) => {
                let successful = survivors.iter().filter(|a| a.status == ArticleStatus::Processed).count();
                if let Some(m) = &self.metrics {
                    m.timing("pipeline.batch.process_batch.duration", elapsed, empty_tags());
                }
                if let Err(e) = self.state.transition("batch", batch_id, "complete", serde_json::json!({"successful": successful})).await {
                    warn!(batch_id, error = %e, "failed to record batch completion state transition");
                }
                info!(batch_id, input_count, successful, elapsed, "batch processed");
                Ok(BatchResult {
                    success: true,
                    batch_id: batch_id.to_string(),
                    articles_processed: input_count,
                    articles_successful: successful,
                    processing_time_seconds: elapsed,
                })
            }
            Err(e) => {
                error!(batch_id, error = %e, "batch processing failed");
                self.mark_batch_failed(batch_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        mut articles: Vec<PipelineArticle>,
        context: &mut ProcessingContext,
    ) -> Result<Vec<PipelineArticle>, PipelineError> {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ValidationStage { config: self.config.clone() }),
            Box::new(FeedHealthStage { cache: self.health_cache.clone(), redis: self.redis.clone() }),
            Box::new(DeduplicationStage { pool: self.pool.clone(), dedup_window_days: self.config.dedup_window_days }),
            Box::new(NormalizationStage { supported_languages: self.config.supported_languages.clone() }),
            Box::new(TextCleaningStage { min_quality_score: self.config.min_quality_score }),
            Box::new(IndexingStage { pool: self.pool.clone(), processing_version: context.processing_version.clone() }),
            Box::new(ChunkingStage {
                pool: self.pool.clone(),
                target_size: self.config.chunking_target_size,
                overlap: self.config.chunking_overlap,
                min_size: self.config.chunking_min_size,
            }),
            Box::new(SearchIndexingStage { pool: self.pool.clone(), metrics: self.metrics.clone() }),
            Box::new(DiagnosticsStage { pool: self.pool.clone(), metrics: self.metrics.clone() }),
        ];

        for stage in &stages {
            if articles.is_empty() {
                break;
            }
            self.set_current_stage(&context.batch_id, stage.name()).await?;
            articles = run_stage(stage.as_ref(), articles, context, self.metrics.as_ref()).await?;
        }

        Ok(articles)
    }

    async fn load_batch_articles(&self, batch_id: &str) -> Result<Vec<PipelineArticle>, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, feed_id, url, url_hash, text_hash, title, description, content, authors, \
                    published_at_raw, published_at, language_raw, fetched_at, retry_count, idempotency_key \
             FROM raw_articles WHERE batch_id = $1 AND status = 'processing'",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(PipelineArticle {
                id: row.try_get("id")?,
                feed_id: row.try_get("feed_id")?,
                url: row.try_get("url")?,
                url_hash: row.try_get("url_hash")?,
                text_hash: row.try_get("text_hash")?,
                canonical_url: None,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                content: row.try_get("content")?,
                clean_text: None,
                authors: row.try_get::<Option<Vec<String>>, _>("authors")?.unwrap_or_default(),
                published_at_raw: row.try_get("published_at_raw")?,
                published_at: row.try_get("published_at")?,
                published_is_estimated: false,
                language_raw: row.try_get("language_raw")?,
                language_detected: None,
                language_confidence: 0.0,
                fetched_at: row.try_get("fetched_at")?,
                retry_count: row.try_get("retry_count")?,
                idempotency_key: row.try_get("idempotency_key")?,
                category: None,
                category_confidence: 0.0,
                tags: Vec::new(),
                keywords: Vec::new(),
                word_count: 0,
                char_count: 0,
                readability_score: None,
                quality_score: 0.0,
                quality_flags: Vec::new(),
                is_duplicate: false,
                dup_reason: None,
                dup_original_id: None,
                dup_similarity_score: None,
                feed_domain: String::new(),
                feed_trust_score: 0.0,
                feed_health_score: 0.0,
                article_id: None,
                status: ArticleStatus::Processing,
                processed_at: None,
                error_log: Vec::<ErrorEntry>::new(),
            });
        }
        Ok(articles)
    }

    async fn set_current_stage(&self, batch_id: &str, stage: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE batches SET current_stage = $2, started_at = COALESCE(started_at, NOW()) WHERE batch_id = $1")
            .bind(batch_id)
            .bind(stage)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_batch_failed(&self, batch_id: &str, error: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE batches SET last_error = $2, completed_at = NOW() WHERE batch_id = $1")
            .bind(batch_id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        if let Err(e) = self.state.transition("batch", batch_id, "fail", serde_json::json!({"error": error})).await {
            warn!(batch_id, error = %e, "failed to record batch failure state transition");
        }
        Ok(())
    }
}
