use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("lock error: {0}")]
    Lock(#[from] feedline_lock::LockError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
