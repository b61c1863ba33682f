use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("lock error: {0}")]
    Lock(#[from] feedline_lock::LockError),
    #[error("planner error: {0}")]
    Planner(#[from] feedline_planner::PlannerError),
    #[error("queue error: {0}")]
    Queue(#[from] feedline_queue::QueueError),
}
