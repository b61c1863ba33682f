use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdempotencyError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
