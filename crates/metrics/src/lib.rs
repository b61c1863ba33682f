pub mod error;
pub mod ring;
pub mod sink;
pub mod types;

pub use error::MetricsError;
pub use ring::RingBuffer;
pub use sink::{spawn_flush_loop, MetricsSink, Timer};
pub use types::{empty_tags, MetricKind, MetricPoint, Tags};
