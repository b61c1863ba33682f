use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Pending,
    Processing,
    Processed,
    Duplicate,
    Rejected,
    Failed,
}

/// Ingested article prior to pipeline processing. Ingested externally in
/// `Pending`; claimed by the planner (`Processing` + lease); terminal state
/// set by the pipeline or the expired-lock sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    pub url_hash: String,
    pub text_hash: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub authors: Vec<String>,
    pub published_at_raw: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub language_raw: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub retry_count: i32,
    pub status: ArticleStatus,
    pub batch_id: Option<String>,
    pub lock_owner: Option<String>,
    pub lock_acquired_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub idempotency_key: String,
}

impl RawArticle {
    /// `(status = Processing) => (lock_owner != None AND lock_expires_at > now)`.
    pub fn lease_is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.status != ArticleStatus::Processing {
            return true;
        }
        match (self.lock_owner.as_ref(), self.lock_expires_at) {
            (Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ArticleStatus::Processed | ArticleStatus::Duplicate | ArticleStatus::Rejected | ArticleStatus::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> RawArticle {
        RawArticle {
            id: 1,
            feed_id: 1,
            url: "https://example.com/a".into(),
            url_hash: "abc".into(),
            text_hash: None,
            title: None,
            description: None,
            content: None,
            authors: vec![],
            published_at_raw: None,
            published_at: None,
            language_raw: None,
            fetched_at: Utc::now(),
            retry_count: 0,
            status: ArticleStatus::Pending,
            batch_id: None,
            lock_owner: None,
            lock_acquired_at: None,
            lock_expires_at: None,
            idempotency_key: "key1".into(),
        }
    }

    #[test]
    fn pending_article_is_always_lease_valid() {
        assert!(base().lease_is_valid(Utc::now()));
    }

    #[test]
    fn processing_without_lock_is_invalid() {
        let mut a = base();
        a.status = ArticleStatus::Processing;
        assert!(!a.lease_is_valid(Utc::now()));
    }

    #[test]
    fn processing_with_expired_lock_is_invalid() {
        let mut a = base();
        a.status = ArticleStatus::Processing;
        a.lock_owner = Some("worker-1".into());
        a.lock_expires_at = Some(Utc::now() - Duration::seconds(10));
        assert!(!a.lease_is_valid(Utc::now()));
    }

    #[test]
    fn terminal_states_are_recognized() {
        let mut a = base();
        a.status = ArticleStatus::Processed;
        assert!(a.is_terminal());
    }
}
