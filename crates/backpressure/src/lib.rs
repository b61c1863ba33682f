pub mod error;
pub mod load;
pub mod monitor;

pub use error::BackpressureError;
pub use load::{AdjustmentTag, LoadSignals};
pub use monitor::{spawn_monitor_loop, Adjustment, BackpressureMonitor, BatchProcessingWindow};
