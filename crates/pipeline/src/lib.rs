pub mod article;
pub mod context;
pub mod error;
pub mod runner;
pub mod stage;
pub mod stages;

pub use article::{ErrorEntry, PipelineArticle};
pub use context::{ProcessingContext, StageMetrics};
pub use error::PipelineError;
pub use runner::{BatchResult, PipelineRunner};
pub use stage::{run_stage, Stage, StageOutcome};
