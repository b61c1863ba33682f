use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::BatchConfiguration;

/// One observation of `(load_factor, batch_size, success_rate)`, recorded
/// after a batch completes (`record_outcome`) and blended into future
/// sizing decisions.
#[derive(Debug, Clone, Copy)]
struct SizingObservation {
    load_factor: f64,
    batch_size: u32,
    success_rate: f64,
}

const MAX_HISTORY: usize = 100;
const SIMILAR_LOAD_EPSILON: f64 = 0.1;

/// Rolling window of past `(load, size, success_rate)` observations used to
/// blend historical evidence into the load-based size adjustment (spec.md
/// §4.7 step 2).
pub struct SizingHistory {
    observations: Mutex<VecDeque<SizingObservation>>,
}

impl Default for SizingHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SizingHistory {
    pub fn new() -> Self {
        Self { observations: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)) }
    }

    pub fn record(&self, load_factor: f64, batch_size: u32, success_rate: f64) {
        let mut obs = self.observations.lock().unwrap();
        if obs.len() >= MAX_HISTORY {
            obs.pop_front();
        }
        obs.push_back(SizingObservation { load_factor, batch_size, success_rate });
    }

    /// Best-performing size among observations within `SIMILAR_LOAD_EPSILON`
    /// of `load_factor`, if any exist.
    fn best_size_near(&self, load_factor: f64) -> Option<u32> {
        let obs = self.observations.lock().unwrap();
        obs.iter()
            .filter(|o| (o.load_factor - load_factor).abs() < SIMILAR_LOAD_EPSILON)
            .max_by(|a, b| a.success_rate.total_cmp(&b.success_rate))
            .map(|o| o.batch_size)
    }
}

/// Adjust `config.target_size` for current load, then blend in the
/// best-performing historical size under similar load, then clamp to
/// `[min_size, max_size]` (spec.md §4.7 step 2).
pub fn calculate_optimal_batch_size(config: &BatchConfiguration, load_factor: f64, history: &SizingHistory) -> u32 {
    let base = config.target_size as f64;

    let adjusted = if load_factor > 0.8 {
        base - base * 0.4
    } else if load_factor > 0.6 {
        base - base * 0.2
    } else if load_factor > 0.4 {
        base - base * 0.1
    } else {
        base + base * 0.1
    };

    let blended = match history.best_size_near(load_factor) {
        Some(best) => 0.7 * adjusted + 0.3 * best as f64,
        None => adjusted,
    };

    (blended.round() as i64).clamp(config.min_size as i64, config.max_size as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedline_core::entities::BatchPriority;

    fn config() -> BatchConfiguration {
        BatchConfiguration {
            target_size: 200,
            min_size: 100,
            max_size: 300,
            priority: BatchPriority::Normal,
            max_age_hours: 72.0,
            min_quality_score: 0.3,
            max_retry_articles_percent: 30.0,
            diversity_factor: 0.2,
        }
    }

    #[test]
    fn high_load_reduces_size_by_40_percent() {
        let history = SizingHistory::new();
        let size = calculate_optimal_batch_size(&config(), 0.9, &history);
        assert_eq!(size, 120);
    }

    #[test]
    fn low_load_increases_size_by_10_percent() {
        let history = SizingHistory::new();
        let size = calculate_optimal_batch_size(&config(), 0.1, &history);
        assert_eq!(size, 220);
    }

    #[test]
    fn result_is_clamped_to_bounds() {
        let history = SizingHistory::new();
        let cfg = BatchConfiguration { min_size: 150, max_size: 180, ..config() };
        let size = calculate_optimal_batch_size(&cfg, 0.1, &history);
        assert_eq!(size, 180);
    }

    #[test]
    fn historical_success_blends_toward_best_known_size() {
        let history = SizingHistory::new();
        history.record(0.5, 250, 0.95);
        history.record(0.5, 150, 0.40);
        let size = calculate_optimal_batch_size(&config(), 0.5, &history);
        // adjusted = 200 - 20 = 180; blended = 0.7*180 + 0.3*250 = 201
        assert_eq!(size, 201);
    }

    #[test]
    fn dissimilar_load_history_is_ignored() {
        let history = SizingHistory::new();
        history.record(0.9, 50, 0.99);
        let size = calculate_optimal_batch_size(&config(), 0.1, &history);
        assert_eq!(size, 220);
    }
}
