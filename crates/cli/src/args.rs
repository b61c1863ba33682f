use clap::{Parser, Subcommand};

/// Operational CLI for the feedline orchestration engine (spec.md §6).
#[derive(Parser, Debug)]
#[command(name = "feedline-cli", version, about = "Operational tooling for feedline")]
pub struct Cli {
    /// Configuration profile (`FEEDLINE_PROFILE`); empty uses unprefixed env vars.
    #[arg(long, env = "FEEDLINE_PROFILE", default_value = "")]
    pub profile: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Form and run a batch, either ad hoc or scoped to specific articles/feeds.
    ProcessArticles(ProcessArticlesArgs),
    /// Check database/cache connectivity and queue backlog; exit code reflects health.
    HealthCheck(HealthCheckArgs),
    /// Print (or continuously poll) the batch queue status.
    Status(StatusArgs),
    /// Run a long-lived consumer that drains the named task queues.
    Worker(WorkerArgs),
    /// Apply (or print) pending database migrations.
    Migrate(MigrateArgs),
}

#[derive(Parser, Debug)]
pub struct ProcessArticlesArgs {
    /// Restrict the batch to these specific raw article ids.
    #[arg(long = "article-id")]
    pub article_id: Vec<i64>,

    /// Restrict the batch to a single feed domain.
    #[arg(long)]
    pub source_domain: Option<String>,

    /// Override the planner's target batch size.
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Cap the number of articles selected, regardless of `--batch-size`.
    #[arg(long)]
    pub max_articles: Option<u32>,

    /// critical | high | normal | low | background
    #[arg(long, default_value = "normal")]
    pub priority: String,

    /// Form the batch and report what would run, without processing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Talk to a running feedline-server instead of connecting directly.
    #[arg(long, conflicts_with = "direct")]
    pub use_coordinator: Option<String>,

    /// Connect directly to Postgres/Redis (default).
    #[arg(long)]
    pub direct: bool,

    #[arg(long)]
    pub worker_id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct HealthCheckArgs {
    /// Overall deadline in seconds for the health probes.
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Print per-component detail instead of just the summary status.
    #[arg(long)]
    pub detailed: bool,

    #[arg(long)]
    pub use_coordinator: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Keep polling and reprinting the queue status.
    #[arg(long)]
    pub watch: bool,

    /// Poll interval in seconds when `--watch` is set.
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    #[arg(long)]
    pub use_coordinator: Option<String>,
}

#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Named queue to drain; omit to drain all 5 in priority order.
    #[arg(long)]
    pub queue: Option<String>,

    /// Number of tasks to run concurrently.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub worker_id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Target revision (defaults to the latest available migration).
    #[arg(long)]
    pub revision: Option<i64>,

    /// Print the pending migration SQL instead of applying it.
    #[arg(long)]
    pub sql: bool,
}
