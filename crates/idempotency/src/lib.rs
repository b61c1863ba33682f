pub mod error;
pub mod store;

pub use error::IdempotencyError;
pub use store::{ClaimOutcome, IdempotencyStore};
