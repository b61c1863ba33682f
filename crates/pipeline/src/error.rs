use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("feed health error: {0}")]
    FeedHealth(#[from] feedline_feedhealth::FeedHealthError),
    #[error("idempotency error: {0}")]
    Idempotency(#[from] feedline_idempotency::IdempotencyError),
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: &'static str, message: String },
}
