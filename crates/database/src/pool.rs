use anyhow::{anyhow, Context};
use config::DatabaseConfig;
use deadpool::managed::QueueMode;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

/// Connection pool type alias
pub type DbPool = Pool;

fn pool_config(config: &DatabaseConfig) -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig {
        max_size: config.max_connections,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        queue_mode: QueueMode::Fifo,
    });
    cfg
}

/// Build a pool that negotiates TLS using the system certificate store
pub fn create_pool_with_native_tls(cfg: Config) -> anyhow::Result<Pool> {
    let connector = native_tls::TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let tls = postgres_native_tls::MakeTlsConnector::new(connector);
    cfg.create_pool(Some(Runtime::Tokio1), tls)
        .map_err(|e| anyhow!("Failed to create pool: {e}"))
}

/// Create a connection pool from configuration
pub async fn create_pool(config: &DatabaseConfig) -> anyhow::Result<Pool> {
    let cfg = pool_config(config);
    let pool = if config.tls_enabled {
        create_pool_with_native_tls(cfg)?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| anyhow!("Failed to create pool: {e}"))?
    };

    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        tls = config.tls_enabled,
        "Database connection pool created"
    );

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow!("Failed to get connection from pool: {e}"))?;
    client
        .simple_query("SELECT 1")
        .await
        .context("Failed to test database connection")?;
    info!("Database connection test successful");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_follows_database_config() {
        let config = DatabaseConfig {
            host: "db.internal".to_string(),
            port: 6432,
            max_connections: 12,
            ..DatabaseConfig::default()
        };

        let cfg = pool_config(&config);

        assert_eq!(cfg.host.as_deref(), Some("db.internal"));
        assert_eq!(cfg.port, Some(6432));
        assert_eq!(cfg.dbname.as_deref(), Some("mail_admin"));
        assert_eq!(cfg.pool.map(|p| p.max_size), Some(12));
    }
}
