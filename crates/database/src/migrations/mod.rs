use crate::pool::DbPool;
use anyhow::{Context, Result};
use refinery::load_sql_migrations;
use std::path::PathBuf;
use tracing::info;

const MIGRATIONS_DIR: &str = "crates/database/src/migrations/sql";

/// Locate the SQL folder from the workspace root, or from the crate when run by its tests
fn migrations_path() -> Result<PathBuf> {
    let from_cwd = std::env::current_dir()
        .context("Failed to get current directory")?
        .join(MIGRATIONS_DIR);
    if from_cwd.is_dir() {
        return Ok(from_cwd);
    }
    Ok(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/migrations/sql"))
}

/// Run database migrations
pub async fn run(pool: &DbPool) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get database connection for migrations")?;

    let migrations_path = migrations_path()?;
    let migrations = load_sql_migrations(&migrations_path).context(format!(
        "Failed to load migrations from {migrations_path:?}"
    ))?;

    let migration_report = refinery::Runner::new(&migrations)
        .run_async(&mut **client)
        .await
        .context("Failed to run migrations")?;

    for migration in migration_report.applied_migrations() {
        info!(migration = %migration.name(), "Applied migration");
    }

    info!("All migrations completed successfully");
    Ok(())
}
