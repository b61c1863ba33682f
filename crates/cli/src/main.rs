mod args;
mod commands;
mod priority;
mod server_client;
mod service_mode;

use clap::Parser;
use feedline_core::config::Config;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    feedline_core::config::load_dotenv();
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Some(Command::Worker(w)) => w.log_level.clone().unwrap_or_else(|| "info".to_string()),
        _ => "info".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let config = Config::for_profile(&cli.profile);
    config.log_summary();

    match cli.command {
        Some(Command::ProcessArticles(args)) => commands::process_articles::run(config, args).await,
        Some(Command::HealthCheck(args)) => {
            let code = commands::health_check::run(config, args).await?;
            std::process::exit(code);
        }
        Some(Command::Status(args)) => commands::status::run(config, args).await,
        Some(Command::Worker(args)) => commands::worker::run(config, args).await,
        Some(Command::Migrate(args)) => commands::migrate::run(config, args).await,
        None => service_mode::run(config).await,
    }
}
