use chrono::Utc;
use feedline_core::entities::{BreakerState, CircuitBreakerState};
use feedline_breaker::CircuitBreakerConfig;

/// Redis key a per-feed `feedline_breaker::CircuitBreaker` mirrors its state
/// to, named `feed:{feed_id}` (see `CircuitBreaker::mirror_state`).
fn mirror_key(feed_id: i64) -> String {
    format!("circuit_breaker:feed:{feed_id}")
}

/// Read-only check of whether a feed's circuit breaker is open, used to
/// filter candidates during batch selection (spec.md §4.7 step 5). This does
/// not own or mutate breaker state -- that belongs to whatever protects the
/// feed's actual fetch calls -- it only reads the mirrored snapshot and
/// applies the same open-to-half-open timeout the breaker itself would.
pub async fn is_open(redis: &mut redis::aio::ConnectionManager, feed_id: i64) -> bool {
    let raw: Option<String> = redis::cmd("GET")
        .arg(mirror_key(feed_id))
        .query_async(redis)
        .await
        .unwrap_or(None);

    let Some(raw) = raw else { return false };
    let Ok(state) = serde_json::from_str::<CircuitBreakerState>(&raw) else { return false };

    match state.state {
        BreakerState::Closed | BreakerState::HalfOpen => false,
        BreakerState::Open => {
            let timeout = CircuitBreakerConfig::default().timeout_seconds;
            match state.last_failure_time {
                Some(last_failure) => (Utc::now() - last_failure).num_seconds() < timeout,
                None => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_key_is_namespaced_per_feed() {
        assert_eq!(mirror_key(42), "circuit_breaker:feed:42");
    }
}
