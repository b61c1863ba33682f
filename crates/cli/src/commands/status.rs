use std::time::Duration;

use feedline_core::config::Config;

use crate::args::StatusArgs;
use crate::server_client::ServerClient;

pub async fn run(config: Config, args: StatusArgs) -> anyhow::Result<()> {
    let state = if args.use_coordinator.is_none() {
        Some(feedline_server::build_app_state(config).await?)
    } else {
        None
    };

    loop {
        let snapshot = match (&state, &args.use_coordinator) {
            (Some(state), _) => serde_json::to_value(state.planner.queue_status().await?)?,
            (None, Some(base_url)) => ServerClient::new(base_url).queue_status().await?,
            (None, None) => unreachable!("state is built whenever --use-coordinator is absent"),
        };
        println!("{snapshot}");

        if !args.watch {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(args.interval)).await;
    }
}
