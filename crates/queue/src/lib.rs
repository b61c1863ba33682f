pub mod batcher;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod sqs;
pub mod task;

pub use batcher::MicroBatcher;
pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use dispatcher::TaskQueue;
pub use error::QueueError;
pub use sqs::SqsConsumer;
pub use task::{encode_task, parse_batch, parse_task, QueueName, RetryPolicy, Task};
