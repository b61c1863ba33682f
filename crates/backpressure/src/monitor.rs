use std::collections::VecDeque;
use std::sync::Mutex;

use feedline_metrics::{empty_tags, MetricsSink};
use sqlx::PgPool;
use sysinfo::System;

use crate::error::BackpressureError;
use crate::load::{AdjustmentTag, LoadSignals};

const LOAD_HISTORY_CAPACITY: usize = 100;

/// Effective window for the `batch_processing` limiter, advisory only:
/// limiters read these on each check rather than being pushed a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchProcessingWindow {
    Normal60s,
    LightThrottle80s,
    MediumThrottle120s,
    Paused,
}

impl BatchProcessingWindow {
    pub fn window_seconds(self) -> Option<u64> {
        match self {
            BatchProcessingWindow::Normal60s => Some(60),
            BatchProcessingWindow::LightThrottle80s => Some(80),
            BatchProcessingWindow::MediumThrottle120s => Some(120),
            BatchProcessingWindow::Paused => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Adjustment {
    pub load_factor: f64,
    pub tag: AdjustmentTag,
    pub batch_processing_window: BatchProcessingWindow,
    /// `Some(new_max)` when the database limiter's max should be halved.
    pub database_limiter_scale: Option<f64>,
}

/// Samples system/pipeline load on an interval and derives advisory
/// throttling adjustments (spec.md §4.5). Limiters consult
/// `current_adjustment()` on each check rather than being pushed commands.
pub struct BackpressureMonitor {
    pool: PgPool,
    metrics: Option<MetricsSink>,
    error_rate_weight: f64,
    system: Mutex<System>,
    history: Mutex<VecDeque<LoadSignals>>,
    current: Mutex<Adjustment>,
}

impl BackpressureMonitor {
    pub fn new(pool: PgPool, error_rate_weight: f64) -> Self {
        Self {
            pool,
            metrics: None,
            error_rate_weight,
            system: Mutex::new(System::new_all()),
            history: Mutex::new(VecDeque::with_capacity(LOAD_HISTORY_CAPACITY)),
            current: Mutex::new(Adjustment {
                load_factor: 0.0,
                tag: AdjustmentTag::Low,
                batch_processing_window: BatchProcessingWindow::Normal60s,
                database_limiter_scale: None,
            }),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn current_adjustment(&self) -> Adjustment {
        *self.current.lock().unwrap()
    }

    async fn sample_signals(&self) -> Result<LoadSignals, BackpressureError> {
        let (cpu_percent, memory_percent, disk_io_wait_percent) = {
            let mut sys = self.system.lock().unwrap();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let cpu = sys.global_cpu_usage() as f64;
            let mem = if sys.total_memory() > 0 {
                (sys.used_memory() as f64 / sys.total_memory() as f64) * 100.0
            } else {
                0.0
            };
            // sysinfo has no portable disk-io-wait counter; approximate with 0
            // until a platform-specific sampler is wired in.
            (cpu, mem, 0.0)
        };

        let queue_depth: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_articles WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;

        let error_rate: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(value) FROM performance_metrics \
             WHERE metric_name = 'batch.error_rate' AND recorded_at > NOW() - INTERVAL '1 minute'",
        )
        .fetch_one(&self.pool)
        .await?;

        let success_rate: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(value) FROM performance_metrics \
             WHERE metric_name = 'batch.success_rate' AND recorded_at > NOW() - INTERVAL '5 minutes'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LoadSignals {
            cpu_percent,
            memory_percent,
            disk_io_wait_percent,
            queue_depth: queue_depth.max(0) as u64,
            error_rate_1min: error_rate.unwrap_or(0.0),
            success_rate_5min: success_rate.unwrap_or(1.0),
        })
    }

    /// One monitoring tick: sample, record, and recompute the advisory
    /// adjustment. Call on a `monitor_interval` ticker (default 30s).
    pub async fn tick(&self) -> Result<Adjustment, BackpressureError> {
        let signals = self.sample_signals().await?;
        let load_factor = signals.load_factor(self.error_rate_weight);

        {
            let mut history = self.history.lock().unwrap();
            if history.len() == LOAD_HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(signals);
        }

        let avg_response_ms: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(value) FROM performance_metrics \
             WHERE metric_name = 'batch.processing_time' AND recorded_at > NOW() - INTERVAL '5 minutes'",
        )
        .fetch_one(&self.pool)
        .await?;

        let tag = AdjustmentTag::from_load_factor(load_factor);
        let batch_processing_window = if load_factor > 0.9 {
            BatchProcessingWindow::Paused
        } else if load_factor > 0.7 {
            BatchProcessingWindow::MediumThrottle120s
        } else if load_factor > 0.5 {
            BatchProcessingWindow::LightThrottle80s
        } else {
            BatchProcessingWindow::Normal60s
        };

        let database_limiter_scale = match avg_response_ms {
            Some(ms) if ms > 5000.0 => Some(0.5),
            _ => None,
        };

        let adjustment = Adjustment { load_factor, tag, batch_processing_window, database_limiter_scale };
        *self.current.lock().unwrap() = adjustment;

        if let Some(m) = &self.metrics {
            m.gauge("backpressure.load_factor", load_factor, empty_tags());
            m.gauge("backpressure.queue_depth", signals.queue_depth as f64, empty_tags());
        }

        Ok(adjustment)
    }
}

/// Spawn the periodic monitor loop.
pub fn spawn_monitor_loop(
    monitor: std::sync::Arc<BackpressureMonitor>,
    interval: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = monitor.tick().await {
                        tracing::warn!(error = %e, "backpressure monitor tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_seconds_matches_tier() {
        assert_eq!(BatchProcessingWindow::Normal60s.window_seconds(), Some(60));
        assert_eq!(BatchProcessingWindow::LightThrottle80s.window_seconds(), Some(80));
        assert_eq!(BatchProcessingWindow::MediumThrottle120s.window_seconds(), Some(120));
        assert_eq!(BatchProcessingWindow::Paused.window_seconds(), None);
    }
}
