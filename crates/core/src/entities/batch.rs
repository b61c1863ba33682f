use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPriority {
    Background,
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    Planning,
    Ready,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled)
    }
}

/// A unit of planned work over a set of `RawArticle`s. `batch_id` is an
/// opaque string (see `feedline_core::hashing` for the id scheme used when
/// minting new batches).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub worker_id: Option<String>,
    pub correlation_id: String,
    pub priority: BatchPriority,
    pub status: BatchStatus,
    pub current_stage: Option<String>,
    pub articles_total: i32,
    pub articles_successful: i32,
    pub articles_failed: i32,
    pub articles_skipped: i32,
    pub config_hash: String,
    pub processing_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
    pub last_error: Option<String>,
}

impl Batch {
    /// `articles_successful + articles_failed + articles_skipped <= articles_total`.
    pub fn accounting_is_valid(&self) -> bool {
        self.articles_successful + self.articles_failed + self.articles_skipped <= self.articles_total
    }

    pub fn articles_accounted_for(&self) -> i32 {
        self.articles_successful + self.articles_failed + self.articles_skipped
    }

    pub fn is_fully_accounted(&self) -> bool {
        self.articles_accounted_for() == self.articles_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(total: i32, s: i32, f: i32, sk: i32) -> Batch {
        Batch {
            batch_id: "b1".into(),
            worker_id: None,
            correlation_id: "c1".into(),
            priority: BatchPriority::Normal,
            status: BatchStatus::Processing,
            current_stage: None,
            articles_total: total,
            articles_successful: s,
            articles_failed: f,
            articles_skipped: sk,
            config_hash: "hash".into(),
            processing_config: serde_json::json!({}),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            processing_time_ms: None,
            last_error: None,
        }
    }

    #[test]
    fn accounting_within_total_is_valid() {
        assert!(batch(10, 5, 2, 1).accounting_is_valid());
    }

    #[test]
    fn overcounted_accounting_is_invalid() {
        assert!(!batch(10, 8, 2, 2).accounting_is_valid());
    }

    #[test]
    fn priority_ordering_places_critical_highest() {
        assert!(BatchPriority::Critical > BatchPriority::High);
        assert!(BatchPriority::Background < BatchPriority::Low);
    }

    #[test]
    fn terminal_statuses() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(!BatchStatus::Processing.is_terminal());
    }
}
