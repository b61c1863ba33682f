use chrono::Utc;
use feedline_metrics::{empty_tags, MetricsSink};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::IdempotencyError;

const DEFAULT_RESULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_PROGRESS_TTL_SECONDS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyInProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressMarker {
    status: &'static str,
    started_at: chrono::DateTime<Utc>,
    metadata: serde_json::Value,
}

/// Idempotency store (spec.md §4.3). `mark_in_progress` is an atomic
/// create-if-absent (`SET NX EX`); `mark_completed` stores the terminal
/// result so a later `is_completed` hit lets the caller skip the work
/// entirely. Writers must consult `is_completed` before doing any work.
#[derive(Clone)]
pub struct IdempotencyStore {
    redis: redis::aio::ConnectionManager,
    metrics: Option<MetricsSink>,
}

impl IdempotencyStore {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn result_key(key: &str) -> String {
        format!("idempotent:{key}")
    }

    fn progress_key(key: &str) -> String {
        format!("idempotent:{key}:progress")
    }

    pub async fn is_completed(&self, key: &str) -> Result<Option<serde_json::Value>, IdempotencyError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(Self::result_key(key)).await?;
        match raw {
            Some(s) => {
                self.record("idempotency.cache_hit");
                Ok(Some(serde_json::from_str(&s)?))
            }
            None => {
                self.record("idempotency.cache_miss");
                Ok(None)
            }
        }
    }

    pub async fn mark_completed(
        &self,
        key: &str,
        result: &serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), IdempotencyError> {
        let mut conn = self.redis.clone();
        let ttl = ttl_seconds.unwrap_or(DEFAULT_RESULT_TTL_SECONDS);
        let payload = serde_json::to_string(result)?;
        conn.set_ex::<_, _, ()>(Self::result_key(key), payload, ttl).await?;
        self.record("idempotency.marked_complete");
        Ok(())
    }

    /// Atomic create-if-absent. Returns `AlreadyInProgress` if another
    /// caller already claimed this key and hasn't cleared it.
    pub async fn mark_in_progress(
        &self,
        key: &str,
        metadata: serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> Result<ClaimOutcome, IdempotencyError> {
        let mut conn = self.redis.clone();
        let ttl = ttl_seconds.unwrap_or(DEFAULT_PROGRESS_TTL_SECONDS);
        let marker = ProgressMarker { status: "in_progress", started_at: Utc::now(), metadata };
        let payload = serde_json::to_string(&marker)?;

        let claimed: bool = redis::cmd("SET")
            .arg(Self::progress_key(key))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();

        if claimed {
            self.record("idempotency.marked_progress");
            Ok(ClaimOutcome::Claimed)
        } else {
            self.record("idempotency.already_in_progress");
            Ok(ClaimOutcome::AlreadyInProgress)
        }
    }

    pub async fn clear_progress(&self, key: &str) -> Result<(), IdempotencyError> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(Self::progress_key(key)).await?;
        Ok(())
    }

    fn record(&self, name: &str) {
        if let Some(m) = &self.metrics {
            m.incr(name, 1.0, empty_tags());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_key_and_result_key_are_distinct() {
        assert_ne!(IdempotencyStore::progress_key("a"), IdempotencyStore::result_key("a"));
        assert_eq!(IdempotencyStore::result_key("a"), "idempotent:a");
        assert_eq!(IdempotencyStore::progress_key("a"), "idempotent:a:progress");
    }
}
