use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedHealthError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("feed {0} not found")]
    NotFound(i64),
}
