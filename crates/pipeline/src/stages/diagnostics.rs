use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use feedline_core::entities::ArticleStatus;
use feedline_metrics::{empty_tags, MetricsSink};
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

const SLOW_BATCH_SECONDS: f64 = 300.0;
const HIGH_ERROR_RATE: f64 = 0.1;
const LOW_SUCCESS_RATE: f64 = 0.8;

struct BatchDiagnostics {
    status_counts: HashMap<&'static str, usize>,
    language_dist: HashMap<String, usize>,
    category_dist: HashMap<String, usize>,
    domain_dist: HashMap<String, usize>,
    quality_scores: Vec<f64>,
    error_types: HashMap<&'static str, usize>,
    rejection_reasons: HashMap<String, usize>,
    total_processing_time: f64,
    success_rate: f64,
    duplicate_rate: f64,
    error_rate: f64,
    articles_total: usize,
}

/// Stage 8 (spec.md §4.9): collects batch-wide diagnostics, persists them,
/// updates the batch's completion accounting, and raises threshold alerts.
/// Unlike earlier stages this never drops articles -- it always returns
/// every article it was given.
pub struct DiagnosticsStage {
    pub pool: PgPool,
    pub metrics: Option<MetricsSink>,
}

#[async_trait]
impl Stage for DiagnosticsStage {
    fn name(&self) -> &'static str {
        "stage_8_diagnostics"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let diagnostics = collect_diagnostics(&articles, context);

        self.store_diagnostics(&context.batch_id, &diagnostics).await?;
        self.update_batch_completion(&context.batch_id, &diagnostics, context).await?;
        self.record_final_metrics(&diagnostics);
        self.check_and_generate_alerts(&context.batch_id, &diagnostics).await?;

        Ok(StageOutcome::new(articles, 0, 0))
    }
}

fn collect_diagnostics(articles: &[PipelineArticle], context: &ProcessingContext) -> BatchDiagnostics {
    let mut status_counts: HashMap<&'static str, usize> = HashMap::new();
    let mut language_dist = HashMap::new();
    let mut category_dist = HashMap::new();
    let mut domain_dist = HashMap::new();
    let mut quality_scores = Vec::new();
    let mut error_types: HashMap<&'static str, usize> = HashMap::new();
    let mut rejection_reasons: HashMap<String, usize> = HashMap::new();

    for article in articles {
        *status_counts.entry(status_key(article.status)).or_insert(0) += 1;

        if article.quality_score > 0.0 {
            quality_scores.push(article.quality_score);
        }

        for error in &article.error_log {
            *error_types.entry(error.error_type).or_insert(0) += 1;
        }

        if let Some(reason) = article.dup_reason {
            *rejection_reasons.entry(reason.to_string()).or_insert(0) += 1;
        }

        if let Some(lang) = &article.language_detected {
            *language_dist.entry(lang.clone()).or_insert(0) += 1;
        }
        if let Some(cat) = &article.category {
            *category_dist.entry(cat.clone()).or_insert(0) += 1;
        }
        if !article.feed_domain.is_empty() {
            *domain_dist.entry(article.feed_domain.clone()).or_insert(0) += 1;
        }
    }

    let articles_total = articles.len().max(1);
    let total_processing_time = context.total_stage_time();
    let error_count: usize = error_types.values().sum();
    let rejection_count: usize = rejection_reasons.values().sum();

    BatchDiagnostics {
        success_rate: *status_counts.get("processed").unwrap_or(&0) as f64 / articles_total as f64,
        duplicate_rate: *status_counts.get("duplicate").unwrap_or(&0) as f64 / articles_total as f64,
        error_rate: error_count as f64 / articles_total as f64,
        articles_total: articles.len(),
        status_counts,
        language_dist,
        category_dist,
        domain_dist,
        quality_scores,
        error_types,
        rejection_reasons,
        total_processing_time,
    }
}

fn status_key(status: ArticleStatus) -> &'static str {
    match status {
        ArticleStatus::Pending => "pending",
        ArticleStatus::Processing => "processing",
        ArticleStatus::Processed => "processed",
        ArticleStatus::Duplicate => "duplicate",
        ArticleStatus::Rejected => "rejected",
        ArticleStatus::Failed => "failed",
    }
}

fn quality_percentiles(scores: &[f64]) -> serde_json::Value {
    if scores.is_empty() {
        return json!({});
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    let at = |p: f64| sorted[((n as f64 * p) as usize).min(n - 1)];

    json!({
        "mean": sorted.iter().sum::<f64>() / n as f64,
        "min": sorted[0],
        "max": sorted[n - 1],
        "p25": at(0.25),
        "p50": at(0.50),
        "p75": at(0.75),
        "p95": if n > 20 { at(0.95) } else { sorted[n - 1] },
    })
}

impl DiagnosticsStage {
    async fn store_diagnostics(&self, batch_id: &str, d: &BatchDiagnostics) -> Result<(), PipelineError> {
        let payload = json!({
            "status_distribution": d.status_counts.iter().map(|(k, v)| (k.to_string(), v)).collect::<HashMap<_, _>>(),
            "language_distribution": d.language_dist,
            "category_distribution": d.category_dist,
            "domain_distribution": d.domain_dist,
            "quality_stats": quality_percentiles(&d.quality_scores),
            "error_types": d.error_types.iter().map(|(k, v)| (k.to_string(), v)).collect::<HashMap<_, _>>(),
            "rejection_reasons": d.rejection_reasons,
            "total_processing_time_seconds": d.total_processing_time,
            "articles_per_second": d.articles_total as f64 / d.total_processing_time.max(1.0),
            "success_rate": d.success_rate,
            "duplicate_rate": d.duplicate_rate,
            "error_rate": d.error_rate,
            "completed_at": Utc::now().to_rfc3339(),
        });

        sqlx::query(
            "INSERT INTO batch_diagnostics (batch_id, diagnostics, recorded_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (batch_id) DO UPDATE SET diagnostics = EXCLUDED.diagnostics, recorded_at = NOW()",
        )
        .bind(batch_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_batch_completion(&self, batch_id: &str, d: &BatchDiagnostics, context: &ProcessingContext) -> Result<(), PipelineError> {
        let processed = *d.status_counts.get("processed").unwrap_or(&0) as i32;
        let failed = (*d.status_counts.get("rejected").unwrap_or(&0) + *d.status_counts.get("failed").unwrap_or(&0)) as i32;
        let skipped = *d.status_counts.get("duplicate").unwrap_or(&0) as i32;
        let elapsed_ms = (context.total_stage_time() * 1000.0) as i64;

        sqlx::query(
            "UPDATE batches SET \
                articles_successful = $2, \
                articles_failed = $3, \
                articles_skipped = $4, \
                processing_time_ms = $5, \
                completed_at = NOW(), \
                current_stage = NULL \
             WHERE batch_id = $1",
        )
        .bind(batch_id)
        .bind(processed)
        .bind(failed)
        .bind(skipped)
        .bind(elapsed_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn record_final_metrics(&self, d: &BatchDiagnostics) {
        let Some(m) = &self.metrics else { return };
        m.histogram("pipeline.batch.duration", d.total_processing_time, empty_tags());
        m.gauge("pipeline.batch.success_rate", d.success_rate, empty_tags());
        m.gauge("pipeline.batch.error_rate", d.error_rate, empty_tags());
        m.gauge("pipeline.batch.duplicate_rate", d.duplicate_rate, empty_tags());
        m.gauge("pipeline.batch.articles_total", d.articles_total as f64, empty_tags());
    }

    async fn check_and_generate_alerts(&self, batch_id: &str, d: &BatchDiagnostics) -> Result<(), PipelineError> {
        let mut alerts = Vec::new();

        if d.error_rate > HIGH_ERROR_RATE {
            alerts.push(("warning", "batch.error_rate", d.error_rate, format!("error rate {:.3} exceeded {HIGH_ERROR_RATE}", d.error_rate)));
        }
        if d.total_processing_time > SLOW_BATCH_SECONDS {
            alerts.push((
                "warning",
                "batch.processing_time",
                d.total_processing_time,
                format!("processing time {:.1}s exceeded {SLOW_BATCH_SECONDS}s", d.total_processing_time),
            ));
        }
        if d.success_rate < LOW_SUCCESS_RATE {
            alerts.push(("critical", "batch.success_rate", d.success_rate, format!("success rate {:.3} fell below {LOW_SUCCESS_RATE}", d.success_rate)));
        }

        if alerts.is_empty() {
            return Ok(());
        }

        for (severity, alert_type, value, message) in &alerts {
            sqlx::query(
                "INSERT INTO alert_events (alert_type, severity, batch_id, value, message, metadata, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW())",
            )
            .bind(alert_type)
            .bind(severity)
            .bind(batch_id)
            .bind(value)
            .bind(message)
            .bind(json!({ "articles_total": d.articles_total }))
            .execute(&self.pool)
            .await?;
        }

        warn!(batch_id, count = alerts.len(), "diagnostics stage generated alerts");
        Ok(())
    }
}
