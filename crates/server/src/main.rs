use clap::Parser;
use feedline_core::config::Config;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "feedline-server", version, about = "Queue/RPC surface for the feedline orchestration engine")]
struct Cli {
    #[arg(long, env = "FEEDLINE_PROFILE", default_value = "")]
    profile: String,
    #[arg(long, env = "FEEDLINE_SERVER_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    feedline_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.log_summary();

    let state = feedline_server::build_app_state(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    feedline_server::spawn_background_tasks(state.clone(), shutdown_rx).await?;

    let app = feedline_server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!("feedline-server listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("feedline-server shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
