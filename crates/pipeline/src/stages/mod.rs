pub mod chunking;
pub mod cleaning;
pub mod dedup;
pub mod diagnostics;
pub mod feed_health;
pub mod indexing;
pub mod normalization;
pub mod search_indexing;
pub mod validation;

pub use chunking::ChunkingStage;
pub use cleaning::TextCleaningStage;
pub use dedup::DeduplicationStage;
pub use diagnostics::DiagnosticsStage;
pub use feed_health::FeedHealthStage;
pub use indexing::IndexingStage;
pub use normalization::NormalizationStage;
pub use search_indexing::SearchIndexingStage;
pub use validation::ValidationStage;
