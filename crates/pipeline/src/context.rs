use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-stage input/output/rejection counts, recorded after each stage runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageMetrics {
    pub articles_in: usize,
    pub articles_out: usize,
    pub articles_rejected: usize,
    pub articles_errors: usize,
}

impl StageMetrics {
    pub fn success_rate(&self) -> f64 {
        self.articles_out as f64 / self.articles_in.max(1) as f64
    }

    pub fn rejection_rate(&self) -> f64 {
        self.articles_rejected as f64 / self.articles_in.max(1) as f64
    }

    pub fn error_rate(&self) -> f64 {
        self.articles_errors as f64 / self.articles_in.max(1) as f64
    }
}

/// Carried through every stage of a single batch run (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub batch_id: String,
    pub worker_id: String,
    pub correlation_id: String,
    pub trace_id: String,
    pub processing_version: String,
    pub started_at: DateTime<Utc>,
    pub stage_timings: HashMap<String, f64>,
    pub stage_metrics: HashMap<String, StageMetrics>,
}

impl ProcessingContext {
    pub fn new(batch_id: impl Into<String>, worker_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            worker_id: worker_id.into(),
            correlation_id: correlation_id.into(),
            trace_id: format!("trace_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]),
            processing_version: "1.0".to_string(),
            started_at: Utc::now(),
            stage_timings: HashMap::new(),
            stage_metrics: HashMap::new(),
        }
    }

    pub fn total_stage_time(&self) -> f64 {
        self.stage_timings.values().sum()
    }
}
