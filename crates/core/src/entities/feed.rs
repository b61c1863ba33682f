use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Active,
    Paused,
    Disabled,
}

/// A source feed. Created externally; `health_score`/`trust_score`/rolling
/// rates are updated by stage metrics and the periodic health-scoring job
/// (feedhealth crate), never by the pipeline stages directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub domain: String,
    pub trust_score: i32,
    pub health_score: i32,
    pub daily_quota: i32,
    pub daily_processed: i32,
    pub error_rate_24h: f64,
    pub duplicate_rate_24h: f64,
    pub consecutive_failures: i32,
    pub status: FeedStatus,
}

impl Feed {
    /// `daily_processed <= daily_quota` whenever quota is enforced (0 = unlimited).
    pub fn has_quota_remaining(&self) -> bool {
        self.daily_quota == 0 || self.daily_processed < self.daily_quota
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, FeedStatus::Active) && self.has_quota_remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(quota: i32, processed: i32) -> Feed {
        Feed {
            id: 1,
            domain: "example.com".into(),
            trust_score: 80,
            health_score: 90,
            daily_quota: quota,
            daily_processed: processed,
            error_rate_24h: 0.0,
            duplicate_rate_24h: 0.0,
            consecutive_failures: 0,
            status: FeedStatus::Active,
        }
    }

    #[test]
    fn unlimited_quota_always_has_remaining() {
        assert!(feed(0, 10_000).has_quota_remaining());
    }

    #[test]
    fn exhausted_quota_blocks_usage() {
        let f = feed(100, 100);
        assert!(!f.has_quota_remaining());
        assert!(!f.is_usable());
    }
}
