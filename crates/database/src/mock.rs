use crate::Database;
use anyhow::{Context, Result};
use std::env;
use tokio::sync::OnceCell;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Connect to the database named by `TEST_DATABASE_URL` and apply the migrations
///
/// Returns `None` when the variable is unset so integration tests can skip.
pub async fn create_test_database() -> Result<Option<Database>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };

    let config = database_url
        .parse::<tokio_postgres::Config>()
        .context("Invalid TEST_DATABASE_URL")?;
    let mgr_config = deadpool_postgres::ManagerConfig {
        recycling_method: deadpool_postgres::RecyclingMethod::Fast,
    };
    let mgr = deadpool_postgres::Manager::from_config(config, tokio_postgres::NoTls, mgr_config);
    let pool = deadpool_postgres::Pool::builder(mgr).max_size(4).build()?;

    let database = Database::new(pool);
    MIGRATED
        .get_or_try_init(|| database.run_migrations())
        .await?;
    Ok(Some(database))
}
