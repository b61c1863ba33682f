use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feedline_core::entities::{LockInfo, LockType};
use feedline_core::hashing::advisory_lock_id;
use feedline_metrics::{empty_tags, MetricsSink};
use redis::Script;
use sqlx::PgPool;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::LockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Acquired,
    Renewed,
    Released,
    Denied,
}

const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local owner = ARGV[1]
local ttl = tonumber(ARGV[2])
local lock_type = ARGV[3]
local metadata = ARGV[4]
local acquired_at = ARGV[5]
local expires_at = ARGV[6]

local current_owner = redis.call('hget', key, 'owner')
if current_owner then
    if current_owner == owner then
        redis.call('expire', key, ttl)
        redis.call('hincrby', key, 'renewal_count', 1)
        return 'renewed'
    else
        return 'denied'
    end
end

redis.call('hmset', key,
    'owner', owner,
    'lock_type', lock_type,
    'acquired_at', acquired_at,
    'expires_at', expires_at,
    'metadata', metadata,
    'renewal_count', 0
)
redis.call('expire', key, ttl)
return 'acquired'
"#;

const RELEASE_SCRIPT: &str = r#"
local key = KEYS[1]
local owner = ARGV[1]
local current_owner = redis.call('hget', key, 'owner')
if current_owner == owner then
    redis.call('del', key)
    return 'released'
else
    return 'not_owner'
end
"#;

const RENEW_SCRIPT: &str = r#"
local key = KEYS[1]
local owner = ARGV[1]
local ttl = tonumber(ARGV[2])
local new_expires_at = ARGV[3]
local current_owner = redis.call('hget', key, 'owner')
if current_owner == owner then
    redis.call('hset', key, 'expires_at', new_expires_at)
    redis.call('hincrby', key, 'renewal_count', 1)
    redis.call('expire', key, ttl)
    return 'renewed'
else
    return 'not_owner'
end
"#;

fn redis_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Distributed lock manager (spec.md §4.2). Exclusive acquire is atomic via
/// a Lua script against the fast KV store; when `metadata.critical = true`
/// or `lock_type = Advisory`, a relational advisory lock is additionally
/// taken, keyed by a stable 32-bit hash of `key`. If the relational path
/// fails after the KV lock succeeded, the KV lock is released to avoid
/// split-brain.
#[derive(Clone)]
pub struct LockManager {
    redis: redis::aio::ConnectionManager,
    pg: PgPool,
    metrics: Option<MetricsSink>,
    default_ttl: Duration,
    acquire_script: Arc<Script>,
    release_script: Arc<Script>,
    renew_script: Arc<Script>,
    renewal_tasks: Arc<AsyncMutex<HashMap<String, tokio::task::JoinHandle<()>>>>,
}

impl LockManager {
    pub fn new(redis: redis::aio::ConnectionManager, pg: PgPool, default_ttl: Duration) -> Self {
        Self {
            redis,
            pg,
            metrics: None,
            default_ttl,
            acquire_script: Arc::new(Script::new(ACQUIRE_SCRIPT)),
            release_script: Arc::new(Script::new(RELEASE_SCRIPT)),
            renew_script: Arc::new(Script::new(RENEW_SCRIPT)),
            renewal_tasks: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<Duration>,
        lock_type: LockType,
        auto_renew: bool,
        metadata: serde_json::Value,
    ) -> Result<LockStatus, LockError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let start = std::time::Instant::now();

        let redis_status = self.acquire_redis_lock(key, owner, ttl, lock_type, &metadata).await?;

        if matches!(redis_status, LockStatus::Acquired | LockStatus::Renewed) {
            let critical = metadata.get("critical").and_then(|v| v.as_bool()).unwrap_or(false);
            if critical || lock_type == LockType::Advisory {
                let pg_status = self.acquire_postgres_lock(key, owner, ttl, &metadata).await?;
                if pg_status != LockStatus::Acquired && redis_status == LockStatus::Acquired {
                    self.release_redis_lock(key, owner).await.ok();
                    return Ok(LockStatus::Denied);
                }
            }
        }

        if redis_status == LockStatus::Acquired && auto_renew {
            self.start_auto_renewal(key, owner, ttl).await;
        }

        if let Some(m) = &self.metrics {
            m.histogram("locks.acquisition_time", start.elapsed().as_secs_f64(), empty_tags());
            m.incr("locks.acquired", 1.0, empty_tags());
        }

        Ok(redis_status)
    }

    async fn acquire_redis_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
        lock_type: LockType,
        metadata: &serde_json::Value,
    ) -> Result<LockStatus, LockError> {
        let acquired_at = Utc::now();
        let expires_at = acquired_at + chrono::Duration::seconds(ttl.as_secs() as i64);
        let mut conn = self.redis.clone();

        let result: String = self
            .acquire_script
            .key(redis_key(key))
            .arg(owner)
            .arg(ttl.as_secs())
            .arg(lock_type_str(lock_type))
            .arg(metadata.to_string())
            .arg(acquired_at.to_rfc3339())
            .arg(expires_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(match result.as_str() {
            "acquired" => LockStatus::Acquired,
            "renewed" => LockStatus::Renewed,
            _ => LockStatus::Denied,
        })
    }

    async fn acquire_postgres_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
        metadata: &serde_json::Value,
    ) -> Result<LockStatus, LockError> {
        let lock_id = advisory_lock_id(key);
        let mut conn = self.pg.acquire().await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_id)
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            return Ok(LockStatus::Denied);
        }

        let expires_at = Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64);
        sqlx::query(
            "INSERT INTO distributed_locks (lock_key, owner, expires_at, metadata) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (lock_key) DO UPDATE SET owner = $2, acquired_at = NOW(), expires_at = $3, metadata = $4",
        )
        .bind(key)
        .bind(owner)
        .bind(expires_at)
        .bind(metadata)
        .execute(&mut *conn)
        .await?;

        Ok(LockStatus::Acquired)
    }

    pub async fn release_lock(&self, key: &str, owner: &str) -> Result<LockStatus, LockError> {
        let redis_status = self.release_redis_lock(key, owner).await?;
        self.release_postgres_lock(key, owner).await?;
        self.stop_auto_renewal(key, owner).await;

        if let Some(m) = &self.metrics {
            m.incr("locks.released", 1.0, empty_tags());
        }

        Ok(redis_status)
    }

    async fn release_redis_lock(&self, key: &str, owner: &str) -> Result<LockStatus, LockError> {
        let mut conn = self.redis.clone();
        let result: String = self.release_script.key(redis_key(key)).arg(owner).invoke_async(&mut conn).await?;
        Ok(if result == "released" { LockStatus::Released } else { LockStatus::Denied })
    }

    async fn release_postgres_lock(&self, key: &str, owner: &str) -> Result<(), LockError> {
        let lock_id = advisory_lock_id(key);
        let mut conn = self.pg.acquire().await?;
        let _: Option<bool> = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(lock_id)
            .fetch_optional(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND owner = $2")
            .bind(key)
            .bind(owner)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn renew_lock(&self, key: &str, owner: &str, additional: Option<Duration>) -> Result<LockStatus, LockError> {
        let additional = additional.unwrap_or(self.default_ttl);
        let new_expires_at = Utc::now() + chrono::Duration::seconds(additional.as_secs() as i64);
        let mut conn = self.redis.clone();

        let result: String = self
            .renew_script
            .key(redis_key(key))
            .arg(owner)
            .arg(additional.as_secs())
            .arg(new_expires_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if result != "renewed" {
            return Ok(LockStatus::Denied);
        }

        let mut pg_conn = self.pg.acquire().await?;
        sqlx::query("UPDATE distributed_locks SET expires_at = $1 WHERE lock_key = $2 AND owner = $3")
            .bind(new_expires_at)
            .bind(key)
            .bind(owner)
            .execute(&mut *pg_conn)
            .await
            .ok();

        if let Some(m) = &self.metrics {
            m.incr("locks.renewed", 1.0, empty_tags());
        }

        Ok(LockStatus::Renewed)
    }

    async fn start_auto_renewal(&self, key: &str, owner: &str, ttl: Duration) {
        let interval = std::cmp::max(ttl / 3, Duration::from_secs(30));
        let manager = self.clone();
        let key_owned = key.to_string();
        let owner_owned = owner.to_string();
        let task_key = format!("{key}:{owner}");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match manager.renew_lock(&key_owned, &owner_owned, None).await {
                    Ok(LockStatus::Renewed) => {}
                    _ => break,
                }
            }
        });

        let mut tasks = self.renewal_tasks.lock().await;
        if let Some(old) = tasks.insert(task_key, handle) {
            old.abort();
        }
    }

    async fn stop_auto_renewal(&self, key: &str, owner: &str) {
        let task_key = format!("{key}:{owner}");
        if let Some(handle) = self.renewal_tasks.lock().await.remove(&task_key) {
            handle.abort();
        }
    }

    pub async fn get_lock_info(&self, key: &str) -> Result<Option<LockInfo>, LockError> {
        use redis::AsyncCommands;
        let mut conn = self.redis.clone();
        let data: HashMap<String, String> = conn.hgetall(redis_key(key)).await?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(lock_info_from_map(key, &data)))
    }

    /// Sweep locks whose `expires_at < now` from both backends; returns the count removed.
    pub async fn cleanup_expired_locks(&self) -> Result<u64, LockError> {
        use redis::AsyncCommands;
        let mut conn = self.redis.clone();
        let mut cleaned = 0u64;
        let now = Utc::now();

        let keys: Vec<String> = conn.keys("lock:*").await?;
        for key in keys {
            let data: HashMap<String, String> = conn.hgetall(&key).await?;
            if let Some(expires_raw) = data.get("expires_at") {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_raw) {
                    if expires_at.with_timezone(&Utc) < now {
                        let _: () = conn.del(&key).await?;
                        cleaned += 1;
                    }
                }
            }
        }

        let result = sqlx::query("DELETE FROM distributed_locks WHERE expires_at < NOW()")
            .execute(&self.pg)
            .await?;
        cleaned += result.rows_affected();

        if let Some(m) = &self.metrics {
            m.gauge("locks.cleanup.count", cleaned as f64, empty_tags());
        }

        Ok(cleaned)
    }
}

fn lock_type_str(t: LockType) -> &'static str {
    match t {
        LockType::Exclusive => "exclusive",
        LockType::Shared => "shared",
        LockType::Advisory => "advisory",
    }
}

fn lock_info_from_map(key: &str, data: &HashMap<String, String>) -> LockInfo {
    let lock_type = match data.get("lock_type").map(String::as_str) {
        Some("shared") => LockType::Shared,
        Some("advisory") => LockType::Advisory,
        _ => LockType::Exclusive,
    };
    let parse_time = |s: Option<&String>| {
        s.and_then(|v| DateTime::parse_from_rfc3339(v).ok()).map(|d| d.with_timezone(&Utc)).unwrap_or_else(Utc::now)
    };
    LockInfo {
        key: key.to_string(),
        owner: data.get("owner").cloned().unwrap_or_default(),
        lock_type,
        acquired_at: parse_time(data.get("acquired_at")),
        expires_at: parse_time(data.get("expires_at")),
        metadata: data
            .get("metadata")
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_else(|| serde_json::json!({})),
        renewal_count: data.get("renewal_count").and_then(|v| v.parse().ok()).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_type_round_trips_through_str() {
        assert_eq!(lock_type_str(LockType::Exclusive), "exclusive");
        assert_eq!(lock_type_str(LockType::Advisory), "advisory");
    }

    #[test]
    fn renewal_interval_floors_at_30s() {
        let ttl = Duration::from_secs(10);
        let interval = std::cmp::max(ttl / 3, Duration::from_secs(30));
        assert_eq!(interval, Duration::from_secs(30));
    }

    #[test]
    fn renewal_interval_scales_with_ttl() {
        let ttl = Duration::from_secs(300);
        let interval = std::cmp::max(ttl / 3, Duration::from_secs(30));
        assert_eq!(interval, Duration::from_secs(100));
    }
}
