use chrono::{DateTime, Utc};

/// An article surfaced by the candidate-selection query, still carrying the
/// priority score the query computed so later filtering stages don't have
/// to re-derive it.
#[derive(Debug, Clone)]
pub struct BatchCandidate {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    pub url_hash: String,
    pub text_hash: Option<String>,
    pub title: Option<String>,
    pub domain: String,
    pub fetched_at: DateTime<Utc>,
    pub retry_count: i32,
    pub priority_score: f64,
    pub priority_tier: i32,
    pub estimated_processing_time_ms: i64,
}

impl BatchCandidate {
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.fetched_at).num_seconds() as f64 / 3600.0
    }

    pub fn is_retry(&self) -> bool {
        self.retry_count > 0
    }

    /// Freshness-weighted urgency (0-100, higher = more urgent). Not part of
    /// the selection `ORDER BY` (the SQL's `priority_score` drives that);
    /// surfaced for diagnostics and batch-outcome logging.
    pub fn urgency_score(&self, now: DateTime<Utc>) -> f64 {
        let age_hours = self.age_hours(now);
        let age_score = (100.0 - age_hours * 2.0).max(0.0);
        let retry_penalty = if age_hours > 1.0 { self.retry_count as f64 * 10.0 } else { 0.0 };
        (age_score - retry_penalty).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(fetched_hours_ago: i64, retry_count: i32) -> BatchCandidate {
        BatchCandidate {
            id: 1,
            feed_id: 1,
            url: "https://example.com/a".into(),
            url_hash: "abc".into(),
            text_hash: None,
            title: None,
            domain: "example.com".into(),
            fetched_at: Utc::now() - Duration::hours(fetched_hours_ago),
            retry_count,
            priority_score: 50.0,
            priority_tier: 1,
            estimated_processing_time_ms: 1000,
        }
    }

    #[test]
    fn fresh_article_has_high_urgency() {
        let c = candidate(0, 0);
        assert!(c.urgency_score(Utc::now()) > 95.0);
    }

    #[test]
    fn stale_retry_article_has_low_urgency() {
        let c = candidate(40, 3);
        assert!(c.urgency_score(Utc::now()) < 30.0);
    }
}
