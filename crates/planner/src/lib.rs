pub mod candidate;
pub mod error;
mod feed_breaker;
pub mod planner;
pub mod selection;
pub mod sizing;
pub mod types;

pub use candidate::BatchCandidate;
pub use error::PlannerError;
pub use planner::{create_cleanup_batch, create_emergency_batch, BatchPlanner, BatchQueueStatus, BatchStatusBucket};
pub use selection::ArticleFilter;
pub use sizing::{calculate_optimal_batch_size, SizingHistory};
pub use types::{BatchConfiguration, LoadMetrics};
