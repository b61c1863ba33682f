use chrono::{DateTime, Utc};
use feedline_core::entities::Feed;

/// Feed health and performance metrics used for batch-inclusion scoring
/// (spec.md §4.6). Wraps the base `Feed` entity with the rolling
/// performance/quality figures the health-scoring job maintains.
#[derive(Debug, Clone)]
pub struct FeedHealthMetrics {
    pub feed: Feed,
    pub avg_response_time_ms: f64,
    pub content_quality_score: f64,
    pub last_success: Option<DateTime<Utc>>,
}

impl FeedHealthMetrics {
    /// `priority_score(feed) ∈ [0, 100]`: trust+health minus penalties for
    /// error rate, duplicate rate, slowness, consecutive failures, and
    /// near-quota usage, plus a quality bonus.
    pub fn priority_score(&self) -> f64 {
        let f = &self.feed;
        let base_score = (f.trust_score as f64 + f.health_score as f64) / 2.0;

        let error_penalty = (f.error_rate_24h * 1000.0).min(50.0);
        let dup_penalty = (f.duplicate_rate_24h * 50.0).min(25.0);
        let speed_penalty = (self.avg_response_time_ms / 100.0).min(25.0);
        let failure_penalty = (f.consecutive_failures as f64 * 5.0).min(30.0);
        let quality_bonus = self.content_quality_score * 20.0;

        let quota_penalty = if f.daily_quota > 0 {
            let usage = f.daily_processed as f64 / f.daily_quota as f64;
            if usage > 0.9 {
                40.0
            } else if usage > 0.7 {
                20.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let score = base_score - error_penalty - dup_penalty - speed_penalty - failure_penalty + quality_bonus
            - quota_penalty;
        score.clamp(0.0, 100.0)
    }

    /// `health_score >= 50 AND consecutive_failures < 5 AND error_rate_24h < 0.5
    /// AND quota not exhausted`.
    pub fn is_healthy(&self) -> bool {
        let f = &self.feed;
        f.health_score >= 50 && f.consecutive_failures < 5 && f.error_rate_24h < 0.5 && f.has_quota_remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedline_core::entities::FeedStatus;

    fn healthy_feed() -> FeedHealthMetrics {
        FeedHealthMetrics {
            feed: Feed {
                id: 1,
                domain: "example.com".into(),
                trust_score: 90,
                health_score: 90,
                daily_quota: 1000,
                daily_processed: 10,
                error_rate_24h: 0.01,
                duplicate_rate_24h: 0.01,
                consecutive_failures: 0,
                status: FeedStatus::Active,
            },
            avg_response_time_ms: 200.0,
            content_quality_score: 0.8,
            last_success: Some(Utc::now()),
        }
    }

    #[test]
    fn healthy_feed_scores_highly() {
        let m = healthy_feed();
        assert!(m.priority_score() > 70.0);
        assert!(m.is_healthy());
    }

    #[test]
    fn high_error_rate_marks_unhealthy() {
        let mut m = healthy_feed();
        m.feed.error_rate_24h = 0.6;
        assert!(!m.is_healthy());
    }

    #[test]
    fn exhausted_quota_marks_unhealthy() {
        let mut m = healthy_feed();
        m.feed.daily_processed = 1000;
        assert!(!m.is_healthy());
    }

    #[test]
    fn near_quota_applies_penalty() {
        let mut m = healthy_feed();
        m.feed.daily_processed = 950;
        let near_quota_score = m.priority_score();

        let mut baseline = healthy_feed();
        baseline.feed.daily_processed = 10;
        assert!(near_quota_score < baseline.priority_score());
    }

    #[test]
    fn consecutive_failures_cap_penalty_at_30() {
        let mut m = healthy_feed();
        m.feed.consecutive_failures = 100;
        let capped_score = m.priority_score();
        m.feed.consecutive_failures = 6;
        assert_eq!(capped_score, m.priority_score());
    }
}
