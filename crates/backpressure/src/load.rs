/// Raw system/pipeline signals sampled once per `monitor_interval`
/// (spec.md §4.5). CPU/memory/disk-io come from the OS; queue depth and
/// recent error/success rates come from the database.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSignals {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_io_wait_percent: f64,
    pub queue_depth: u64,
    pub error_rate_1min: f64,
    pub success_rate_5min: f64,
}

impl LoadSignals {
    /// Mean of normalized signals, clamped to `[0, 1]`. `error_rate_weight`
    /// defaults to `2.0` in `feedline_core::config::BackpressureConfig`,
    /// per the Open Question in spec.md §9.
    pub fn load_factor(&self, error_rate_weight: f64) -> f64 {
        let success_rate = if self.success_rate_5min == 0.0 && self.error_rate_1min == 0.0 {
            1.0
        } else {
            self.success_rate_5min
        };

        let factors = [
            self.cpu_percent / 100.0,
            self.memory_percent / 100.0,
            self.disk_io_wait_percent / 100.0,
            (self.queue_depth as f64 / 1000.0).min(1.0),
            self.error_rate_1min * error_rate_weight,
            (1.0 - success_rate).max(0.0),
        ];

        let mean = factors.iter().sum::<f64>() / factors.len() as f64;
        mean.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentTag {
    Critical,
    High,
    Medium,
    Low,
}

impl AdjustmentTag {
    pub fn from_load_factor(load_factor: f64) -> Self {
        if load_factor > 0.9 {
            AdjustmentTag::Critical
        } else if load_factor > 0.7 {
            AdjustmentTag::High
        } else if load_factor > 0.5 {
            AdjustmentTag::Medium
        } else {
            AdjustmentTag::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_system_has_near_zero_load() {
        let signals = LoadSignals { success_rate_5min: 1.0, ..Default::default() };
        assert!(signals.load_factor(2.0) < 0.01);
    }

    #[test]
    fn fully_loaded_system_clamps_at_one() {
        let signals = LoadSignals {
            cpu_percent: 100.0,
            memory_percent: 100.0,
            disk_io_wait_percent: 100.0,
            queue_depth: 5000,
            error_rate_1min: 1.0,
            success_rate_5min: 0.0,
        };
        assert_eq!(signals.load_factor(2.0), 1.0);
    }

    #[test]
    fn tag_thresholds_match_spec() {
        assert_eq!(AdjustmentTag::from_load_factor(0.95), AdjustmentTag::Critical);
        assert_eq!(AdjustmentTag::from_load_factor(0.8), AdjustmentTag::High);
        assert_eq!(AdjustmentTag::from_load_factor(0.6), AdjustmentTag::Medium);
        assert_eq!(AdjustmentTag::from_load_factor(0.3), AdjustmentTag::Low);
    }
}
