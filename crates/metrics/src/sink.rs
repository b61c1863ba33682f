use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::PgPool;

use crate::error::MetricsError;
use crate::ring::RingBuffer;
use crate::types::{MetricKind, MetricPoint, Tags};

const RECENT_CAPACITY: usize = 1000;
const KV_RETENTION_SECONDS: i64 = 24 * 3600;

/// In-memory buffered metrics sink (spec.md §4.1). `incr`/`gauge`/etc. never
/// touch the network: they push onto a bounded in-process buffer that a
/// background task drains on size or interval. The sink never raises
/// through the hot path — flush failures are counted and the points are
/// returned to the buffer (bounded; oldest dropped on overflow).
#[derive(Clone)]
pub struct MetricsSink {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: Mutex<Vec<MetricPoint>>,
    recent: Mutex<RingBuffer<MetricPoint>>,
    flush_size: usize,
    max_buffer: usize,
    notify: tokio::sync::Notify,
    flush_errors: AtomicU64,
    dropped: AtomicU64,
}

impl MetricsSink {
    pub fn new(flush_size: usize, max_buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(Vec::with_capacity(flush_size)),
                recent: Mutex::new(RingBuffer::new(RECENT_CAPACITY)),
                flush_size,
                max_buffer,
                notify: tokio::sync::Notify::new(),
                flush_errors: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn record(&self, name: &str, kind: MetricKind, value: f64, tags: Tags) {
        let point = MetricPoint {
            name: name.to_string(),
            kind,
            value,
            tags,
            timestamp_ms: Utc::now().timestamp_millis(),
        };

        self.inner.recent.lock().unwrap().push(point.clone());

        let mut buf = self.inner.buffer.lock().unwrap();
        if buf.len() >= self.inner.max_buffer {
            buf.remove(0);
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buf.push(point);
        let should_flush = buf.len() >= self.inner.flush_size;
        drop(buf);
        if should_flush {
            self.inner.notify.notify_one();
        }
    }

    pub fn incr(&self, name: &str, value: f64, tags: Tags) {
        self.record(name, MetricKind::Counter, value, tags);
    }

    pub fn gauge(&self, name: &str, value: f64, tags: Tags) {
        self.record(name, MetricKind::Gauge, value, tags);
    }

    pub fn histogram(&self, name: &str, value: f64, tags: Tags) {
        self.record(name, MetricKind::Histogram, value, tags);
    }

    pub fn timing(&self, name: &str, seconds: f64, tags: Tags) {
        self.record(name, MetricKind::Timing, seconds, tags);
    }

    pub fn rate(&self, name: &str, value: f64, tags: Tags) {
        self.record(name, MetricKind::Rate, value, tags);
    }

    /// Block-scoped timer: records elapsed seconds under `name` when dropped.
    pub fn timer(&self, name: &str, tags: Tags) -> Timer {
        Timer { sink: self.clone(), name: name.to_string(), tags, start: Instant::now() }
    }

    pub fn flush_error_count(&self) -> u64 {
        self.inner.flush_errors.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn buffered_count(&self) -> usize {
        self.inner.buffer.lock().unwrap().len()
    }

    /// Text-format export of recent history for scraping: one line per point.
    pub fn export_text(&self) -> String {
        self.inner
            .recent
            .lock()
            .unwrap()
            .iter()
            .map(MetricPoint::to_text_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn drain_buffer(&self) -> Vec<MetricPoint> {
        let mut buf = self.inner.buffer.lock().unwrap();
        std::mem::take(&mut *buf)
    }

    fn requeue(&self, mut points: Vec<MetricPoint>) {
        let mut buf = self.inner.buffer.lock().unwrap();
        points.append(&mut buf);
        if points.len() > self.inner.max_buffer {
            let overflow = points.len() - self.inner.max_buffer;
            points.drain(0..overflow);
            self.inner.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }
        *buf = points;
    }

    /// Flush the current buffer to the fast KV store (sliding-window
    /// retention) and the durable relational store. Best-effort: a failure
    /// in either backend re-queues the drained points and increments the
    /// error counter rather than propagating.
    pub async fn flush_once(
        &self,
        pool: &PgPool,
        redis: &mut redis::aio::ConnectionManager,
    ) -> Result<usize, MetricsError> {
        let points = self.drain_buffer();
        if points.is_empty() {
            return Ok(0);
        }
        let n = points.len();

        if let Err(e) = self.flush_to_kv(redis, &points).await {
            tracing::warn!(error = %e, count = n, "metrics kv flush failed, requeuing");
            self.inner.flush_errors.fetch_add(1, Ordering::Relaxed);
            self.requeue(points);
            return Err(e);
        }

        if let Err(e) = self.flush_to_db(pool, &points).await {
            tracing::warn!(error = %e, count = n, "metrics db flush failed, requeuing");
            self.inner.flush_errors.fetch_add(1, Ordering::Relaxed);
            self.requeue(points);
            return Err(e);
        }

        Ok(n)
    }

    async fn flush_to_kv(
        &self,
        redis: &mut redis::aio::ConnectionManager,
        points: &[MetricPoint],
    ) -> Result<(), MetricsError> {
        let mut pipe = redis::pipe();
        for p in points {
            let key = format!("metrics:{}", p.name);
            let member = serde_json::to_string(p).unwrap_or_default();
            pipe.zadd(&key, member, p.timestamp_ms).ignore();
            pipe.expire(&key, KV_RETENTION_SECONDS).ignore();
        }
        pipe.query_async::<_, ()>(redis).await.map_err(MetricsError::from)
    }

    async fn flush_to_db(&self, pool: &PgPool, points: &[MetricPoint]) -> Result<(), MetricsError> {
        let mut tx = pool.begin().await?;
        for p in points {
            sqlx::query(
                "INSERT INTO performance_metrics (metric_name, metric_kind, value, tags, recorded_at) \
                 VALUES ($1, $2, $3, $4, to_timestamp($5::double precision / 1000.0))",
            )
            .bind(&p.name)
            .bind(format!("{:?}", p.kind).to_lowercase())
            .bind(p.value)
            .bind(serde_json::to_value(&p.tags).unwrap_or_default())
            .bind(p.timestamp_ms)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Background task: flushes on `flush_size` (via `Notify`) or `interval`,
/// whichever comes first.
pub fn spawn_flush_loop(
    sink: MetricsSink,
    pool: PgPool,
    mut redis: redis::aio::ConnectionManager,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = sink.inner.notify.notified() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
            if let Err(e) = sink.flush_once(&pool, &mut redis).await {
                tracing::debug!(error = %e, "scheduled metrics flush failed");
            }
        }
    })
}

pub struct Timer {
    sink: MetricsSink,
    name: String,
    tags: Tags,
    start: Instant,
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        self.sink.timing(&self.name, elapsed, std::mem::take(&mut self.tags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::empty_tags;

    #[test]
    fn incr_buffers_without_flushing_below_threshold() {
        let sink = MetricsSink::new(10, 100);
        sink.incr("articles.processed", 1.0, empty_tags());
        assert_eq!(sink.buffered_count(), 1);
        assert_eq!(sink.flush_error_count(), 0);
    }

    #[test]
    fn overflow_past_max_buffer_drops_oldest() {
        let sink = MetricsSink::new(1000, 2);
        sink.incr("a", 1.0, empty_tags());
        sink.incr("b", 2.0, empty_tags());
        sink.incr("c", 3.0, empty_tags());
        assert_eq!(sink.buffered_count(), 2);
        assert_eq!(sink.dropped_count(), 1);
    }

    #[test]
    fn timer_records_on_drop() {
        let sink = MetricsSink::new(10, 100);
        {
            let _t = sink.timer("stage.duration", empty_tags());
        }
        assert_eq!(sink.buffered_count(), 1);
    }

    #[test]
    fn export_text_lists_recent_points() {
        let sink = MetricsSink::new(10, 100);
        sink.gauge("backpressure.load_factor", 0.42, empty_tags());
        let text = sink.export_text();
        assert!(text.contains("backpressure.load_factor 0.42"));
    }
}
