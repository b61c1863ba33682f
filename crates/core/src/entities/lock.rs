use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Exclusive,
    Shared,
    Advisory,
}

/// State of one held lock, mirrored between the KV backend and (for
/// `critical`/`advisory` locks) a relational advisory lock. See
/// `feedline_lock` for the acquire/renew/release state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub key: String,
    pub owner: String,
    pub lock_type: LockType,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub renewal_count: i32,
}

impl LockInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_owned_by(&self, candidate: &str) -> bool {
        self.owner == candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_check() {
        let now = Utc::now();
        let lock = LockInfo {
            key: "batch_creation".into(),
            owner: "worker-1".into(),
            lock_type: LockType::Exclusive,
            acquired_at: now - Duration::seconds(60),
            expires_at: now - Duration::seconds(1),
            metadata: serde_json::json!({}),
            renewal_count: 0,
        };
        assert!(lock.is_expired(now));
        assert!(lock.is_owned_by("worker-1"));
        assert!(!lock.is_owned_by("worker-2"));
    }
}
