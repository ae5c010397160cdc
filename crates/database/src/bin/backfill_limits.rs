use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use config::{LimitsAppConfig, LoggingConfig};
use database::Database;
use services::limits::sync::backfill_all;
use services::limits::LimitSynchronizer;
use services::metrics::NoopMetricsService;
use services::principals::PrincipalKind;
use services::settings::StaticSettingsService;
use tracing::info;

/// Create the limit records missing for existing users and domains
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let config = match std::env::args().nth(1) {
        Some(path) => LimitsAppConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => LimitsAppConfig::from_env()
            .map_err(|e| anyhow!("Failed to load configuration: {e}"))?,
    };
    init_tracing(&config.logging);

    info!("Starting limit records backfill");

    let database = Database::from_config(&config.database)
        .await
        .context("Failed to connect to database")?;
    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let ids = [
        (PrincipalKind::User, database.principals.list_ids(PrincipalKind::User).await?),
        (PrincipalKind::Domain, database.principals.list_ids(PrincipalKind::Domain).await?),
    ];

    let synchronizer = LimitSynchronizer::new(
        Arc::new(database.limits.clone()),
        Arc::new(StaticSettingsService::new(config.parameters)),
        Arc::new(NoopMetricsService),
    );

    for (kind, ids) in ids {
        let principals = ids.len();
        let created = backfill_all(&synchronizer, kind, ids)
            .await
            .with_context(|| format!("Backfill of {kind} limits failed"))?;
        info!(kind = %kind, principals, created, "Backfill finished");
    }

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_target(false)
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
