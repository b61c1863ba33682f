use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackpressureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
