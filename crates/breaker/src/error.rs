use thiserror::Error;

#[derive(Error, Debug)]
pub enum BreakerError {
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
    #[error("rate limit exceeded for '{0}'")]
    RateLimited(String),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
}
