//! Shared data model (spec.md §3). Every crate in the workspace that needs
//! to name a `Feed`, `Batch`, `RawArticle`, etc. imports it from here rather
//! than redeclaring it, so the on-wire/on-disk shape has exactly one source
//! of truth.

mod article;
mod batch;
mod breaker;
mod chunk;
mod feed;
mod index;
mod lock;

pub use article::{ArticleStatus, RawArticle};
pub use batch::{Batch, BatchPriority, BatchStatus};
pub use breaker::CircuitBreakerState;
pub use chunk::{Chunk, ChunkStrategy, SemanticType};
pub use feed::{Feed, FeedStatus};
pub use index::ArticleIndex;
pub use lock::{LockInfo, LockType};
