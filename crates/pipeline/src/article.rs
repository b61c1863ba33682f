use chrono::{DateTime, Utc};
use feedline_core::entities::ArticleStatus;
use feedline_core::error::RejectionReason;

/// One entry in an article's processing error log (distinct from a stage
/// rejection -- these are unexpected failures, logged but not necessarily
/// fatal to the article).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: &'static str,
    pub error_type: &'static str,
    pub message: String,
}

/// The working article record threaded through every pipeline stage.
/// Seeded from a `RawArticle` at load time, accumulates derived fields
/// stage by stage, and is split off into `ArticleIndex`/`Chunk` rows at the
/// indexing/chunking stage boundaries rather than being a distinct type per
/// stage.
#[derive(Debug, Clone)]
pub struct PipelineArticle {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    pub url_hash: String,
    pub text_hash: Option<String>,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub clean_text: Option<String>,
    pub authors: Vec<String>,
    pub published_at_raw: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub published_is_estimated: bool,
    pub language_raw: Option<String>,
    pub language_detected: Option<String>,
    pub language_confidence: f64,
    pub fetched_at: DateTime<Utc>,
    pub retry_count: i32,
    pub idempotency_key: String,

    pub category: Option<String>,
    pub category_confidence: f64,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,

    pub word_count: usize,
    pub char_count: usize,
    pub readability_score: Option<f64>,
    pub quality_score: f64,
    pub quality_flags: Vec<String>,

    pub is_duplicate: bool,
    pub dup_reason: Option<RejectionReason>,
    pub dup_original_id: Option<String>,
    pub dup_similarity_score: Option<f64>,

    pub feed_domain: String,
    pub feed_trust_score: f64,
    pub feed_health_score: f64,

    pub article_id: Option<String>,
    pub status: ArticleStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_log: Vec<ErrorEntry>,
}

impl PipelineArticle {
    pub fn add_error(&mut self, stage: &'static str, error_type: &'static str, message: impl Into<String>) {
        self.error_log.push(ErrorEntry { timestamp: Utc::now(), stage, error_type, message: message.into() });
    }

    pub fn add_quality_flag(&mut self, flag: &str, severity: &str) {
        let entry = format!("{severity}:{flag}");
        if !self.quality_flags.contains(&entry) {
            self.quality_flags.push(entry);
        }
    }

    /// Marks the article rejected (a terminal, non-retriable outcome for this
    /// batch run) with the given reason recorded in `dup_reason`.
    pub fn set_rejected(&mut self, reason: RejectionReason) {
        self.status = ArticleStatus::Rejected;
        self.dup_reason = Some(reason);
    }

    pub fn set_duplicate(&mut self, reason: RejectionReason, original_id: String, similarity: f64) {
        self.status = ArticleStatus::Duplicate;
        self.is_duplicate = true;
        self.dup_reason = Some(reason);
        self.dup_original_id = Some(original_id);
        self.dup_similarity_score = Some(similarity);
    }

    pub fn error_quality_penalty(&self) -> f64 {
        let errors = self.quality_flags.iter().filter(|f| f.starts_with("error:")).count();
        let warnings = self.quality_flags.iter().filter(|f| f.starts_with("warning:")).count();
        errors as f64 * 0.1 + warnings as f64 * 0.05
    }
}
