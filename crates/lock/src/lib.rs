pub mod error;
pub mod manager;

pub use error::LockError;
pub use manager::{LockManager, LockStatus};
