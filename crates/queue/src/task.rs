//! Task envelope, named priority queues, and retry/backoff policy
//! (spec.md §4.10).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// One of the queues the scheduler and workers must agree on (spec.md §4.10).
/// Priority is the queue's own fixed weight, independent of any per-task
/// `priority` field carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    Emergency,
    BatchProcessing,
    FeedManagement,
    Maintenance,
    Default,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Emergency,
        QueueName::BatchProcessing,
        QueueName::FeedManagement,
        QueueName::Maintenance,
        QueueName::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Emergency => "emergency",
            QueueName::BatchProcessing => "batch_processing",
            QueueName::FeedManagement => "feed_management",
            QueueName::Maintenance => "maintenance",
            QueueName::Default => "default",
        }
    }

    /// Fixed queue priority per spec.md §4.10 (higher runs first).
    pub fn priority(&self) -> u8 {
        match self {
            QueueName::Emergency => 10,
            QueueName::BatchProcessing => 5,
            QueueName::FeedManagement => 3,
            QueueName::Maintenance => 1,
            QueueName::Default => 0,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task envelope carried as a queue message body (spec.md §4.10): `{task_type,
/// payload, priority, attempt, max_attempts, eta}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub task_type: String,
    pub payload: Value,
    pub priority: u8,
    pub attempt: u32,
    pub max_attempts: u32,
    /// Earliest time this task should be considered due. Workers that poll a
    /// message whose `eta` is still in the future should treat it like an
    /// empty poll and let it reappear after the provider's visibility timeout.
    pub eta: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Value, priority: u8, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            priority,
            attempt: 0,
            max_attempts,
            eta: now,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.eta <= now
    }

    /// Returns a copy bumped for the next retry attempt, with `eta` pushed out
    /// by the retry policy's backoff.
    pub fn for_retry(&self, policy: &RetryPolicy) -> Task {
        let mut next = self.clone();
        next.attempt += 1;
        next.eta = Utc::now() + ChronoDuration::from_std(policy.delay_for(next.attempt)).unwrap_or_default();
        next
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Exponential backoff with jitter (spec.md §4.10): `base * 2^attempt`, jittered
/// into `[0.8, 1.2]` of that value, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: Duration::from_secs(5), max_delay: Duration::from_secs(900) }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt.min(20) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let jitter = jittered_factor();
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}

/// Deterministic-shape jitter factor in `[0.8, 1.2]`. Uses the low bits of the
/// current time rather than a `rand` dependency, since this crate has no
/// other use for a thread-local RNG.
fn jittered_factor() -> f64 {
    let nanos = Utc::now().timestamp_subsec_nanos();
    0.8 + (nanos % 4001) as f64 / 10000.0
}

/// Parse a queue message body into a [`Task`] envelope.
pub fn parse_task(msg: &QueueMessage) -> Result<Task, QueueError> {
    serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("invalid task envelope in message {}: {}", msg.id, e)))
}

/// Serialize a [`Task`] into a queue message body.
pub fn encode_task(task: &Task) -> Result<String, QueueError> {
    serde_json::to_string(task).map_err(|e| QueueError::Parse(format!("failed to encode task {}: {}", task.task_id, e)))
}

/// Parse a batch of messages, separating successes from failures. Bad
/// envelopes never block good ones from being processed.
pub fn parse_batch(messages: &[QueueMessage]) -> (Vec<Task>, Vec<(String, QueueError)>) {
    let mut tasks = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for msg in messages {
        match parse_task(msg) {
            Ok(task) => tasks.push(task),
            Err(e) => errors.push((msg.id.clone(), e)),
        }
    }

    (tasks, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_msg(body: String) -> QueueMessage {
        QueueMessage { id: "msg-1".into(), body, receipt_handle: "h".into(), timestamp: Utc::now(), attempt_count: 1 }
    }

    #[test]
    fn queue_name_priorities_match_spec() {
        assert_eq!(QueueName::Emergency.priority(), 10);
        assert_eq!(QueueName::BatchProcessing.priority(), 5);
        assert_eq!(QueueName::FeedManagement.priority(), 3);
        assert_eq!(QueueName::Maintenance.priority(), 1);
    }

    #[test]
    fn task_roundtrips_through_encode_parse() {
        let task = Task::new("create_batch", serde_json::json!({"size": 100}), 5, 3);
        let body = encode_task(&task).unwrap();
        let parsed = parse_task(&make_msg(body)).unwrap();
        assert_eq!(parsed.task_type, "create_batch");
        assert_eq!(parsed.task_id, task.task_id);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy { base: Duration::from_secs(1), max_delay: Duration::from_secs(30) };
        let d0 = policy.delay_for(0);
        let d5 = policy.delay_for(5);
        assert!(d0.as_secs_f64() <= 1.2 * 1.0 + 0.001);
        assert!(d5.as_secs_f64() <= 30.0 * 1.2 + 0.001);
    }

    #[test]
    fn retries_exhausted_at_max_attempts() {
        let mut task = Task::new("x", serde_json::json!({}), 0, 2);
        assert!(!task.retries_exhausted());
        task.attempt = 2;
        assert!(task.retries_exhausted());
    }

    #[test]
    fn parse_batch_is_partial_tolerant() {
        let messages = vec![
            make_msg(encode_task(&Task::new("a", serde_json::json!({}), 0, 1)).unwrap()),
            make_msg("not json".to_string()),
        ];
        let (tasks, errors) = parse_batch(&messages);
        assert_eq!(tasks.len(), 1);
        assert_eq!(errors.len(), 1);
    }
}
