use feedline_core::config::Config;
use sqlx::postgres::PgPoolOptions;

use crate::args::MigrateArgs;

const MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../migrations");

/// Applies (or, with `--sql`, prints) the workspace-root migrations -- the
/// same `sqlx::migrate!` directory the teacher's `init_pg_pool` points at,
/// here driven explicitly instead of at pool-construction time so the CLI
/// can run it as a standalone operational step.
pub async fn run(config: Config, args: MigrateArgs) -> anyhow::Result<()> {
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(MIGRATIONS_DIR)).await?;

    if args.sql {
        for m in migrator.migrations.iter() {
            if args.revision.is_some_and(|r| m.version > r) {
                continue;
            }
            println!("-- V{} {}\n{}\n", m.version, m.description, m.sql);
        }
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.connection_string())
        .await?;

    match args.revision {
        None => {
            migrator.run(&pool).await?;
            println!("{}", serde_json::json!({ "applied": "latest" }));
        }
        Some(revision) => {
            for m in migrator.migrations.iter().filter(|m| m.version <= revision) {
                sqlx::raw_sql(&m.sql).execute(&pool).await?;
            }
            println!("{}", serde_json::json!({ "applied_up_to": revision }));
        }
    }

    Ok(())
}
