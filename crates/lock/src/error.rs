use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lock '{0}' is held by another owner")]
    Denied(String),
}
