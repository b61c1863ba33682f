pub mod circuit;
pub mod error;
pub mod limiter;

pub use circuit::{CallResult, CircuitBreaker, CircuitBreakerConfig};
pub use error::BreakerError;
pub use limiter::{adaptive_scale, RateLimitStrategy, RateLimiter, RateLimiterConfig};
