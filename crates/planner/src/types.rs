use feedline_backpressure::LoadSignals;
use feedline_core::entities::BatchPriority;

/// System load snapshot sampled fresh at batch-creation time (spec.md §4.7
/// step 2). Converted into a [`LoadSignals`] and fed through
/// `feedline_backpressure::LoadSignals::load_factor` -- the same §4.5
/// formula the backpressure monitor uses -- rather than a second, separate
/// load-factor formula, per spec.md §4.7 step 2's "(§4.5)" cross-reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadMetrics {
    pub active_workers: i64,
    pub avg_batch_time_seconds: f64,
    pub queue_depth: i64,
    pub error_rate_1h: f64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
    pub disk_io_wait_percent: f64,
}

impl LoadMetrics {
    /// `error_rate_1h` stands in for `LoadSignals::error_rate_1min` and its
    /// complement for `success_rate_5min` -- the planner only has an hourly
    /// window to sample from, not the monitor's shorter rolling windows.
    pub fn load_factor(&self, error_rate_weight: f64) -> f64 {
        let signals = LoadSignals {
            cpu_percent: self.cpu_usage_percent,
            memory_percent: self.memory_usage_percent,
            disk_io_wait_percent: self.disk_io_wait_percent,
            queue_depth: self.queue_depth.max(0) as u64,
            error_rate_1min: self.error_rate_1h,
            success_rate_5min: (1.0 - self.error_rate_1h).max(0.0),
        };
        signals.load_factor(error_rate_weight)
    }
}

/// Per-call batch configuration (spec.md §4.7). Distinct from
/// `feedline_core::config::PlannerConfig`, which holds process-wide defaults
/// this is constructed from.
#[derive(Debug, Clone)]
pub struct BatchConfiguration {
    pub target_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub priority: BatchPriority,
    pub max_age_hours: f64,
    pub min_quality_score: f64,
    pub max_retry_articles_percent: f64,
    pub diversity_factor: f64,
}

impl BatchConfiguration {
    pub fn from_defaults(defaults: &feedline_core::config::PlannerConfig, priority: BatchPriority) -> Self {
        Self {
            target_size: defaults.target_size,
            min_size: defaults.min_size,
            max_size: defaults.max_size,
            priority,
            max_age_hours: defaults.max_age_hours,
            min_quality_score: defaults.min_quality_score,
            max_retry_articles_percent: defaults.max_retry_articles_percent,
            diversity_factor: defaults.diversity_factor,
        }
    }

    /// Canonical (sorted-key) JSON used for `config_hash` (spec.md §4.7 step 6).
    pub fn canonical_json(&self) -> serde_json::Value {
        serde_json::json!({
            "target_size": self.target_size,
            "min_size": self.min_size,
            "max_size": self.max_size,
            "priority": self.priority,
            "max_age_hours": self.max_age_hours,
            "min_quality_score": self.min_quality_score,
            "max_retry_articles_percent": self.max_retry_articles_percent,
            "diversity_factor": self.diversity_factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_factor_matches_backpressure_signals_formula() {
        let l = LoadMetrics {
            cpu_usage_percent: 80.0,
            memory_usage_percent: 90.0,
            disk_io_wait_percent: 20.0,
            queue_depth: 1000,
            error_rate_1h: 0.0,
            ..Default::default()
        };
        let expected = LoadSignals {
            cpu_percent: 80.0,
            memory_percent: 90.0,
            disk_io_wait_percent: 20.0,
            queue_depth: 1000,
            error_rate_1min: 0.0,
            success_rate_5min: 1.0,
        }
        .load_factor(2.0);
        assert!((l.load_factor(2.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn idle_system_has_near_zero_load_factor() {
        let l = LoadMetrics::default();
        assert_eq!(l.load_factor(2.0), 0.0);
    }
}
