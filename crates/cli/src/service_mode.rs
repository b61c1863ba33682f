//! `SERVICE_MODE` env-var dispatch for deployments that invoke the binary
//! without a subcommand (e.g. a container `CMD` set once per Railway
//! service), mirroring the dispatch table in the original multi-process
//! launcher. This workspace runs one unified pipeline rather than separate
//! per-stage services, so every processing mode besides `bot` converges on
//! the same worker consumer loop; `bot` (a Telegram front-end) is out of
//! scope and refused.

use feedline_core::config::Config;

use crate::args::WorkerArgs;
use crate::commands::worker;

const DEFAULT_MODE: &str = "openai-migration";

pub async fn run(config: Config) -> anyhow::Result<()> {
    let mode = std::env::var("SERVICE_MODE").unwrap_or_else(|_| DEFAULT_MODE.to_string());

    match mode.as_str() {
        "poll" | "work" | "work-continuous" | "embedding" | "chunking" | "chunk-continuous" | "fts"
        | "fts-continuous" | "openai-migration" => {
            tracing::info!(mode = %mode, "SERVICE_MODE resolved to the worker consumer loop");
            worker::run(
                config,
                WorkerArgs { queue: None, concurrency: 4, log_level: None, worker_id: None },
            )
            .await
        }
        "bot" => {
            anyhow::bail!(
                "SERVICE_MODE=bot (Telegram front-end) is not implemented by this engine"
            );
        }
        other => anyhow::bail!("unknown SERVICE_MODE '{other}'"),
    }
}
