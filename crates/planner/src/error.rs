use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lock error: {0}")]
    Lock(#[from] feedline_lock::LockError),
}
