use feedline_core::config::Config;
use feedline_planner::{ArticleFilter, BatchConfiguration};

use crate::args::ProcessArticlesArgs;
use crate::priority::parse_priority;
use crate::server_client::ServerClient;

pub async fn run(config: Config, args: ProcessArticlesArgs) -> anyhow::Result<()> {
    let priority = parse_priority(&args.priority)?;
    let worker_id = args.worker_id.clone().unwrap_or_else(|| config.worker_id.clone());

    if let Some(base_url) = &args.use_coordinator {
        if !args.article_id.is_empty() || args.source_domain.is_some() {
            tracing::warn!(
                "--article-id/--source-domain only narrow selection in direct mode; \
                 the coordinator's create_batch RPC ignores them"
            );
        }
        let client = ServerClient::new(base_url);
        let created = client.create_batch(Some(&worker_id), &args.priority).await?;
        let batch_id = created.get("batch_id").and_then(|v| v.as_str()).map(str::to_string);
        match batch_id {
            None => println!("{}", serde_json::json!({ "batch_id": null, "processed": false })),
            Some(id) if args.dry_run => {
                println!("{}", serde_json::json!({ "batch_id": id, "processed": false, "dry_run": true }))
            }
            Some(id) => {
                let result = client.process_batch(&id, Some(&worker_id)).await?;
                println!("{}", serde_json::json!({ "batch_id": id, "processed": true, "result": result }));
            }
        }
        return Ok(());
    }

    let state = feedline_server::build_app_state(config).await?;

    let mut planner_config = BatchConfiguration::from_defaults(&state.config.planner, priority);
    if let Some(size) = args.batch_size {
        planner_config.target_size = size;
    }
    if let Some(max) = args.max_articles {
        planner_config.max_size = planner_config.max_size.min(max);
        planner_config.target_size = planner_config.target_size.min(max);
    }

    let filter = ArticleFilter {
        article_ids: (!args.article_id.is_empty()).then(|| args.article_id.clone()),
        source_domain: args.source_domain.clone(),
    };

    let batch_id = state
        .planner
        .create_batch_filtered(&planner_config, &worker_id, None, &filter)
        .await?;

    match batch_id {
        None => {
            println!("{}", serde_json::json!({ "batch_id": null, "processed": false }));
            Ok(())
        }
        Some(batch_id) if args.dry_run => {
            println!("{}", serde_json::json!({ "batch_id": batch_id, "processed": false, "dry_run": true }));
            Ok(())
        }
        Some(batch_id) => {
            let result = state.runner.process_batch(&batch_id, &worker_id).await?;
            println!(
                "{}",
                serde_json::json!({
                    "batch_id": batch_id,
                    "processed": true,
                    "success": result.success,
                    "articles_processed": result.articles_processed,
                    "articles_successful": result.articles_successful,
                    "processing_time_seconds": result.processing_time_seconds,
                })
            );
            Ok(())
        }
    }
}
