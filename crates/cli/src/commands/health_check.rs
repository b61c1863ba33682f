use std::time::Duration;

use feedline_core::config::Config;

use crate::args::HealthCheckArgs;
use crate::server_client::ServerClient;

/// 0 = healthy, 1 = degraded, 2 = unhealthy (spec.md §6).
pub async fn run(config: Config, args: HealthCheckArgs) -> anyhow::Result<i32> {
    if let Some(base_url) = &args.use_coordinator {
        let client = ServerClient::new(base_url);
        let timeout = Duration::from_secs(args.timeout);
        return Ok(match tokio::time::timeout(timeout, client.health_check()).await {
            Ok(Ok(body)) => {
                if args.detailed {
                    println!("{body}");
                }
                0
            }
            Ok(Err(e)) => {
                println!("{}", serde_json::json!({ "status": "unhealthy", "error": e.to_string() }));
                2
            }
            Err(_) => {
                println!("{}", serde_json::json!({ "status": "unhealthy", "error": "timed out" }));
                2
            }
        });
    }

    let timeout = Duration::from_secs(args.timeout);
    let probe = tokio::time::timeout(timeout, probe_direct(&config));
    let (db_ok, redis_ok, pending_articles) = match probe.await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            println!("{}", serde_json::json!({ "status": "unhealthy", "error": e.to_string() }));
            return Ok(2);
        }
        Err(_) => {
            println!("{}", serde_json::json!({ "status": "unhealthy", "error": "timed out" }));
            return Ok(2);
        }
    };

    let status_code = if !db_ok || !redis_ok {
        2
    } else if pending_articles > config.scheduler.emergency_queue_depth_threshold as i64 {
        1
    } else {
        0
    };

    let status = match status_code {
        0 => "healthy",
        1 => "degraded",
        _ => "unhealthy",
    };

    if args.detailed {
        println!(
            "{}",
            serde_json::json!({
                "status": status,
                "database": db_ok,
                "redis": redis_ok,
                "pending_articles": pending_articles,
                "emergency_threshold": config.scheduler.emergency_queue_depth_threshold,
            })
        );
    } else {
        println!("{}", serde_json::json!({ "status": status }));
    }

    Ok(status_code)
}

async fn probe_direct(config: &Config) -> anyhow::Result<(bool, bool, i64)> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.connection_string())
        .await?;
    let db_ok = sqlx::query("SELECT 1").execute(&pool).await.is_ok();

    let redis_client = redis::Client::open(config.cache.url.clone())?;
    let mut redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let redis_ok: bool = redis::cmd("PING")
        .query_async::<_, String>(&mut redis_conn)
        .await
        .map(|pong| pong == "PONG")
        .unwrap_or(false);

    let locks = feedline_lock::LockManager::new(redis_conn.clone(), pool.clone(), Duration::from_secs(30));
    let planner = feedline_planner::BatchPlanner::new(pool.clone(), redis_conn, locks);
    let pending_articles = planner.queue_status().await.map(|s| s.pending_articles).unwrap_or(0);

    Ok((db_ok, redis_ok, pending_articles))
}
