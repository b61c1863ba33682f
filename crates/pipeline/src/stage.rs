use std::time::Instant;

use async_trait::async_trait;
use feedline_metrics::{empty_tags, MetricsSink};
use tracing::info;

use crate::article::PipelineArticle;
use crate::context::{ProcessingContext, StageMetrics};
use crate::error::PipelineError;

/// What a stage produces: the surviving articles plus how many were
/// rejected/errored along the way (rejected/errored articles are not
/// carried forward -- the runner only passes `survivors` to the next stage).
pub struct StageOutcome {
    pub survivors: Vec<PipelineArticle>,
    pub rejected: usize,
    pub errors: usize,
}

impl StageOutcome {
    pub fn new(survivors: Vec<PipelineArticle>, rejected: usize, errors: usize) -> Self {
        Self { survivors, rejected, errors }
    }
}

/// One stage of the 9-stage pipeline (spec.md §4.9). Stages are pure with
/// respect to the context (only `run_stage` mutates `stage_timings`/
/// `stage_metrics`); they may freely mutate the articles they're given.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError>;
}

/// Runs a stage with timing/metrics bookkeeping identical across every
/// stage implementation, so individual stages only implement `process`.
pub async fn run_stage(
    stage: &dyn Stage,
    articles: Vec<PipelineArticle>,
    context: &mut ProcessingContext,
    metrics: Option<&MetricsSink>,
) -> Result<Vec<PipelineArticle>, PipelineError> {
    let name = stage.name();
    let input_count = articles.len();
    let started = Instant::now();

    let outcome = stage.process(articles, context).await?;

    let elapsed = started.elapsed().as_secs_f64();
    context.stage_timings.insert(name.to_string(), elapsed);

    let stage_metrics = StageMetrics {
        articles_in: input_count,
        articles_out: outcome.survivors.len(),
        articles_rejected: outcome.rejected,
        articles_errors: outcome.errors,
    };

    if let Some(m) = metrics {
        m.histogram(&format!("pipeline.stage.{name}.duration"), elapsed, empty_tags());
        m.histogram(&format!("pipeline.stage.{name}.input_count"), input_count as f64, empty_tags());
        m.histogram(&format!("pipeline.stage.{name}.output_count"), stage_metrics.articles_out as f64, empty_tags());
        m.histogram(&format!("pipeline.stage.{name}.rejection_rate"), stage_metrics.rejection_rate(), empty_tags());
        m.histogram(&format!("pipeline.stage.{name}.success_rate"), stage_metrics.success_rate(), empty_tags());
    }

    let survivors = outcome.survivors;
    info!(stage = name, input = input_count, output = survivors.len(), "pipeline stage complete");
    context.stage_metrics.insert(name.to_string(), stage_metrics);

    Ok(survivors)
}
