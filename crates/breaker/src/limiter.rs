use feedline_metrics::{empty_tags, MetricsSink};
use redis::AsyncCommands;

use crate::error::BreakerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStrategy {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    Adaptive,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub strategy: RateLimitStrategy,
    pub max: u64,
    pub window_seconds: u64,
    pub burst_allowance: u64,
}

impl RateLimiterConfig {
    pub fn fixed_window(max: u64, window_seconds: u64) -> Self {
        Self { strategy: RateLimitStrategy::FixedWindow, max, window_seconds, burst_allowance: 0 }
    }

    pub fn sliding_window(max: u64, window_seconds: u64) -> Self {
        Self { strategy: RateLimitStrategy::SlidingWindow, max, window_seconds, burst_allowance: 0 }
    }

    pub fn token_bucket(max: u64, window_seconds: u64, burst_allowance: u64) -> Self {
        Self { strategy: RateLimitStrategy::TokenBucket, max, window_seconds, burst_allowance }
    }

    pub fn adaptive(max: u64, window_seconds: u64) -> Self {
        Self { strategy: RateLimitStrategy::Adaptive, max, window_seconds, burst_allowance: 0 }
    }
}

/// Scales `max` by the current backpressure load factor, per spec.md §4.4's
/// adaptive strategy table.
pub fn adaptive_scale(load_factor: f64) -> f64 {
    if load_factor > 0.9 {
        0.2
    } else if load_factor > 0.7 {
        0.5
    } else if load_factor > 0.5 {
        0.8
    } else {
        1.0
    }
}

/// Rate limiter supporting four strategies, selectable per limiter
/// (spec.md §4.4). Atomic via Redis scripting/pipelines so concurrent
/// clients see a consistent admit/reject decision.
#[derive(Clone)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    redis: redis::aio::ConnectionManager,
    metrics: Option<MetricsSink>,
}

const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

redis.call('zremrangebyscore', key, '-inf', window_start)
local count = redis.call('zcard', key)
if count + cost > max then
    return 0
end
for i = 1, cost do
    redis.call('zadd', key, now, now .. ':' .. i .. ':' .. math.random())
end
redis.call('expire', key, 3600)
return 1
"#;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local bucket = redis.call('hmget', key, 'tokens', 'updated_at')
local tokens = tonumber(bucket[1])
local updated_at = tonumber(bucket[2])

if tokens == nil then
    tokens = capacity
    updated_at = now
end

local elapsed = math.max(0, now - updated_at)
tokens = math.min(capacity, tokens + elapsed * refill_rate)

if tokens < cost then
    redis.call('hmset', key, 'tokens', tokens, 'updated_at', now)
    redis.call('expire', key, 3600)
    return 0
end

tokens = tokens - cost
redis.call('hmset', key, 'tokens', tokens, 'updated_at', now)
redis.call('expire', key, 3600)
return 1
"#;

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig, redis: redis::aio::ConnectionManager) -> Self {
        Self { name: name.into(), config, redis, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// `check(key, cost, load_factor)`. `load_factor` is only consulted by
    /// the adaptive strategy; pass `0.0` for the other three.
    pub async fn check(&self, key: &str, cost: u64, load_factor: f64) -> Result<bool, BreakerError> {
        let admitted = match self.config.strategy {
            RateLimitStrategy::FixedWindow => self.fixed_window(key, cost).await?,
            RateLimitStrategy::SlidingWindow => self.sliding_window(key, cost, self.config.max).await?,
            RateLimitStrategy::TokenBucket => self.token_bucket(key, cost).await?,
            RateLimitStrategy::Adaptive => {
                let scale = adaptive_scale(load_factor);
                let scaled_max = ((self.config.max as f64) * scale).max(1.0) as u64;
                self.sliding_window(key, cost, scaled_max).await?
            }
        };

        if let Some(m) = &self.metrics {
            let mut tags = empty_tags();
            tags.insert("name".into(), self.name.clone());
            m.incr(if admitted { "rate_limiter.admitted" } else { "rate_limiter.rejected" }, 1.0, tags);
        }

        Ok(admitted)
    }

    async fn fixed_window(&self, key: &str, cost: u64) -> Result<bool, BreakerError> {
        let mut conn = self.redis.clone();
        let bucket = chrono::Utc::now().timestamp() as u64 / self.config.window_seconds;
        let redis_key = format!("ratelimit:fixed:{}:{}:{}", self.name, key, bucket);

        let count: u64 = conn.incr(&redis_key, cost).await?;
        if count == cost {
            let _: () = conn.expire(&redis_key, self.config.window_seconds as i64).await?;
        }
        Ok(count <= self.config.max)
    }

    async fn sliding_window(&self, key: &str, cost: u64, max: u64) -> Result<bool, BreakerError> {
        let mut conn = self.redis.clone();
        let redis_key = format!("ratelimit:sliding:{}:{}", self.name, key);
        let now = chrono::Utc::now().timestamp_millis() as f64;
        let window_start = now - (self.config.window_seconds as f64 * 1000.0);

        let admitted: i64 = redis::Script::new(SLIDING_WINDOW_SCRIPT)
            .key(redis_key)
            .arg(now)
            .arg(window_start)
            .arg(max)
            .arg(cost)
            .invoke_async(&mut conn)
            .await?;

        Ok(admitted == 1)
    }

    async fn token_bucket(&self, key: &str, cost: u64) -> Result<bool, BreakerError> {
        let mut conn = self.redis.clone();
        let redis_key = format!("ratelimit:bucket:{}:{}", self.name, key);
        let now = chrono::Utc::now().timestamp() as f64;
        let refill_rate = self.config.max as f64 / self.config.window_seconds as f64;
        let capacity = (self.config.max + self.config.burst_allowance) as f64;

        let admitted: i64 = redis::Script::new(TOKEN_BUCKET_SCRIPT)
            .key(redis_key)
            .arg(now)
            .arg(refill_rate)
            .arg(capacity)
            .arg(cost)
            .invoke_async(&mut conn)
            .await?;

        Ok(admitted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_scale_thresholds() {
        assert_eq!(adaptive_scale(0.95), 0.2);
        assert_eq!(adaptive_scale(0.8), 0.5);
        assert_eq!(adaptive_scale(0.6), 0.8);
        assert_eq!(adaptive_scale(0.3), 1.0);
    }

    #[test]
    fn adaptive_scale_boundary_is_exclusive() {
        assert_eq!(adaptive_scale(0.9), 0.5);
        assert_eq!(adaptive_scale(0.7), 0.8);
        assert_eq!(adaptive_scale(0.5), 1.0);
    }
}
