use std::sync::Arc;
use std::time::Duration;

use feedline_core::config::Config;
use feedline_core::entities::BatchPriority;
use feedline_planner::{create_emergency_batch, BatchConfiguration};
use feedline_queue::{QueueMessage, QueueName, Task, TaskQueue};
use feedline_server::AppState;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::args::WorkerArgs;

/// Drains the named task queues and dispatches on `task_type`, the consumer
/// side of what `feedline-scheduler` enqueues (spec.md §6 `worker` command).
pub async fn run(config: Config, args: WorkerArgs) -> anyhow::Result<()> {
    let state = feedline_server::build_app_state(config).await?;
    let queue = Arc::new(
        TaskQueue::from_config(&state.config.aws, &state.config.queue, state.pool.clone()).await?,
    );
    let worker_id = args.worker_id.clone().unwrap_or_else(|| state.config.worker_id.clone());

    let queues: Vec<QueueName> = match &args.queue {
        Some(name) => vec![parse_queue_name(name)?],
        None => QueueName::ALL.to_vec(),
    };

    info!(?queues, concurrency = args.concurrency, "worker starting");

    let mut shutdown_signal = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("worker received shutdown signal");
                break;
            }
            result = poll_cycle(&state, &queue, &queues, args.concurrency, &worker_id) => {
                if let Err(e) = result {
                    warn!(error = %e, "poll cycle failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    Ok(())
}

fn parse_queue_name(name: &str) -> anyhow::Result<QueueName> {
    QueueName::ALL
        .iter()
        .copied()
        .find(|q| q.as_str() == name)
        .ok_or_else(|| anyhow::anyhow!("unknown queue '{name}'"))
}

async fn poll_cycle(
    state: &Arc<AppState>,
    queue: &Arc<TaskQueue>,
    queues: &[QueueName],
    concurrency: usize,
    worker_id: &str,
) -> anyhow::Result<()> {
    let mut found_any = false;

    for &queue_name in queues {
        let messages = queue.poll(queue_name, concurrency as u32).await?;
        if messages.is_empty() {
            continue;
        }
        found_any = true;

        let mut tasks = JoinSet::new();
        for (msg, task) in messages {
            let state = state.clone();
            let queue = queue.clone();
            let worker_id = worker_id.to_string();
            tasks.spawn(async move { handle_one(&state, &queue, queue_name, msg, task, &worker_id).await });
        }
        while tasks.join_next().await.is_some() {}
    }

    if !found_any {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Ok(())
}

async fn handle_one(
    state: &Arc<AppState>,
    queue: &Arc<TaskQueue>,
    queue_name: QueueName,
    msg: QueueMessage,
    task: Task,
    worker_id: &str,
) {
    let outcome = dispatch(state, &task, worker_id).await;
    match outcome {
        Ok(()) => {
            if let Err(e) = queue.ack(queue_name, &msg).await {
                warn!(error = %e, task_id = %task.task_id, "failed to ack completed task");
            }
        }
        Err(e) => {
            warn!(error = %e, task_id = %task.task_id, task_type = %task.task_type, "task failed");
            if let Err(e) = queue.nack_or_dead_letter(queue_name, &msg, &task, &e.to_string()).await {
                warn!(error = %e, task_id = %task.task_id, "failed to nack/dead-letter task");
            }
        }
    }
}

async fn dispatch(state: &Arc<AppState>, task: &Task, worker_id: &str) -> anyhow::Result<()> {
    match task.task_type.as_str() {
        "create_batch" => {
            let tier = task.payload.get("priority_tier").and_then(|v| v.as_str()).unwrap_or("normal");
            let priority = match tier {
                "high" => BatchPriority::High,
                "low" => BatchPriority::Low,
                _ => BatchPriority::Normal,
            };
            let config = BatchConfiguration::from_defaults(&state.config.planner, priority);
            if let Some(batch_id) = state.planner.create_batch(&config, worker_id, None).await? {
                state.runner.process_batch(&batch_id, worker_id).await?;
            }
            Ok(())
        }
        "emergency_batch" => {
            let max_size = task.payload.get("max_size").and_then(|v| v.as_u64()).unwrap_or(50) as u32;
            if let Some(batch_id) = create_emergency_batch(&state.planner, worker_id, max_size).await? {
                state.runner.process_batch(&batch_id, worker_id).await?;
            }
            Ok(())
        }
        "cleanup_expired_locks" => {
            let count = state.planner.cleanup_expired_locks().await?;
            info!(count, "cleaned up expired locks");
            Ok(())
        }
        "feed_health_check" => {
            let result = feedline_server::feedhealth_job::run_feed_health_check(&state.pool, &state.feed_health, None).await?;
            info!(updated_feeds = result.updated_feeds, "refreshed feed health scores");
            Ok(())
        }
        other => {
            warn!(task_type = other, "unrecognized task type, dropping");
            Ok(())
        }
    }
}
