use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use feedline_core::entities::{BreakerState, CircuitBreakerState};
use feedline_metrics::MetricsSink;
use tokio::sync::Mutex;

use crate::error::BreakerError;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: i64,
    pub max_requests_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 3, timeout_seconds: 60, max_requests_half_open: 5 }
    }
}

/// Circuit breaker guarding a protected call (spec.md §4.4). State
/// transitions follow the table in the spec exactly; every transition is
/// mirrored to the KV store so replicas converge on the same view.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
    redis: Option<redis::aio::ConnectionManager>,
    metrics: Option<MetricsSink>,
}

/// Outcome of a call attempted through the breaker.
pub enum CallResult<T, E> {
    Ok(T),
    CallFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        Self {
            state: Arc::new(Mutex::new(CircuitBreakerState::closed(name.clone()))),
            name,
            config,
            redis: None,
            metrics: None,
        }
    }

    pub fn with_redis(mut self, redis: redis::aio::ConnectionManager) -> Self {
        self.redis = Some(redis);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn state(&self) -> CircuitBreakerState {
        self.state.lock().await.clone()
    }

    /// Execute `f` through the breaker. Returns `CircuitOpen` immediately
    /// without invoking `f` if the breaker is (still) open.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<CallResult<T, E>, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check_state_transition().await;

        {
            let mut state = self.state.lock().await;
            match state.state {
                BreakerState::Open => {
                    self.record_blocked(&state).await;
                    return Err(BreakerError::CircuitOpen(self.name.clone()));
                }
                BreakerState::HalfOpen => {
                    if state.half_open_requests >= self.config.max_requests_half_open {
                        self.record_blocked(&state).await;
                        return Err(BreakerError::CircuitOpen(self.name.clone()));
                    }
                    state.half_open_requests += 1;
                }
                BreakerState::Closed => {}
            }
        }

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(CallResult::Ok(value))
            }
            Err(e) => {
                self.record_failure().await;
                Ok(CallResult::CallFailed(e))
            }
        }
    }

    async fn check_state_transition(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        match state.state {
            BreakerState::Open => {
                if let Some(last_failure) = state.last_failure_time {
                    if (now - last_failure).num_seconds() >= self.config.timeout_seconds {
                        self.transition_to(&mut state, BreakerState::HalfOpen).await;
                    }
                }
            }
            BreakerState::HalfOpen => {
                if state.success_count >= self.config.success_threshold {
                    self.transition_to(&mut state, BreakerState::Closed).await;
                } else if state.failure_count > 0 {
                    self.transition_to(&mut state, BreakerState::Open).await;
                }
            }
            BreakerState::Closed => {}
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.success_count += 1;
        if state.state == BreakerState::Closed {
            state.failure_count = state.failure_count.saturating_sub(1);
        }
        self.mirror_state(&state).await;
        if let Some(m) = &self.metrics {
            let mut tags = feedline_metrics::empty_tags();
            tags.insert("name".into(), self.name.clone());
            m.incr("circuit_breaker.success", 1.0, tags);
        }
    }

    async fn record_failure(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        state.last_failure_time = Some(now);

        if state.state == BreakerState::Closed && state.failure_count >= self.config.failure_threshold {
            self.transition_to(&mut state, BreakerState::Open).await;
        } else if state.state == BreakerState::HalfOpen {
            self.transition_to(&mut state, BreakerState::Open).await;
        } else {
            self.mirror_state(&state).await;
        }

        if let Some(m) = &self.metrics {
            let mut tags = feedline_metrics::empty_tags();
            tags.insert("name".into(), self.name.clone());
            m.incr("circuit_breaker.failure", 1.0, tags);
        }
    }

    async fn record_blocked(&self, state: &CircuitBreakerState) {
        if let Some(m) = &self.metrics {
            let mut tags = feedline_metrics::empty_tags();
            tags.insert("name".into(), self.name.clone());
            tags.insert("state".into(), format!("{:?}", state.state).to_lowercase());
            m.incr("circuit_breaker.blocked", 1.0, tags);
        }
    }

    async fn transition_to(&self, state: &mut CircuitBreakerState, to: BreakerState) {
        state.state = to;
        state.half_open_requests = 0;
        match to {
            BreakerState::Open => {}
            BreakerState::HalfOpen => {
                state.success_count = 0;
                state.failure_count = 0;
            }
            BreakerState::Closed => {
                state.failure_count = 0;
                state.success_count = 0;
            }
        }
        self.mirror_state(state).await;
        if let Some(m) = &self.metrics {
            let mut tags = feedline_metrics::empty_tags();
            tags.insert("name".into(), self.name.clone());
            tags.insert("to_state".into(), format!("{:?}", to).to_lowercase());
            m.incr("circuit_breaker.state_change", 1.0, tags);
        }
    }

    async fn mirror_state(&self, state: &CircuitBreakerState) {
        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let payload = serde_json::to_string(state).unwrap_or_default();
            let _: Result<(), _> = redis::cmd("SET")
                .arg(format!("circuit_breaker:{}", self.name))
                .arg(payload)
                .query_async(&mut conn)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_breaker_allows_calls() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());
        let result = breaker.call(|| async { Ok::<_, ()>(42) }).await.unwrap();
        assert!(matches!(result, CallResult::Ok(42)));
    }

    #[tokio::test]
    async fn failures_trip_breaker_open() {
        let cfg = CircuitBreakerConfig { failure_threshold: 2, ..Default::default() };
        let breaker = CircuitBreaker::new("test", cfg);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>("boom") }).await.unwrap();
        }

        let state = breaker.state().await;
        assert_eq!(state.state, BreakerState::Open);

        let err = breaker.call(|| async { Ok::<_, ()>(1) }).await;
        assert!(matches!(err, Err(BreakerError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn success_in_closed_state_decrements_failure_count() {
        let cfg = CircuitBreakerConfig { failure_threshold: 5, ..Default::default() };
        let breaker = CircuitBreaker::new("test", cfg);

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await.unwrap();
        let _ = breaker.call(|| async { Ok::<_, ()>(1) }).await.unwrap();

        let state = breaker.state().await;
        assert_eq!(state.failure_count, 0);
    }

    #[tokio::test]
    async fn half_open_transitions_to_closed_after_success_threshold() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout_seconds: 0,
            max_requests_half_open: 5,
        };
        let breaker = CircuitBreaker::new("test", cfg);

        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await.unwrap();
        assert_eq!(breaker.state().await.state, BreakerState::Open);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Ok::<_, ()>(1) }).await.unwrap();
        }

        assert_eq!(breaker.state().await.state, BreakerState::Closed);
    }
}
