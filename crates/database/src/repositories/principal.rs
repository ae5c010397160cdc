use crate::pool::DbPool;
use crate::repositories::limit_record::{insert_records, row_to_record};
use crate::repositories::utils::map_db_error;
use crate::retry_db;
use anyhow::{Context, Result};
use services::common::RepositoryError;
use services::limits::{LimitRecord, LimitSynchronizer};
use services::principals::{Domain, DomainId, PrincipalKind, User, UserId, UserRole};
use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

/// Users and domains as stored by the administration core
#[derive(Debug, Clone)]
pub struct PgPrincipalRepository {
    pool: DbPool,
}

impl PgPrincipalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, username: &str, role: UserRole) -> Result<User> {
        let row = retry_db!("create_user", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_one(
                    "INSERT INTO users (username, role) VALUES ($1, $2)
                     RETURNING id, username, role",
                    &[&username, &role.as_str()],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(row_to_user(&row)?)
    }

    pub async fn create_domain(&self, name: &str) -> Result<Domain> {
        let row = retry_db!("create_domain", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_one(
                    "INSERT INTO domains (name) VALUES ($1) RETURNING id, name",
                    &[&name],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(Domain {
            id: DomainId(row.get("id")),
            name: row.get("name"),
        })
    }

    /// Insert a user and its limit records in one transaction
    ///
    /// The records are resolved before anything is written, so a configuration
    /// error such as a missing default leaves no user behind.
    pub async fn create_user_with_limits(
        &self,
        username: &str,
        role: UserRole,
        creating_actor: Option<&User>,
        synchronizer: &LimitSynchronizer,
    ) -> Result<(User, Vec<LimitRecord>)> {
        let user = User {
            id: UserId(Uuid::new_v4()),
            username: username.to_string(),
            role,
        };
        let records = synchronizer
            .plan_user_records(&user, creating_actor)
            .await?;

        let rows = retry_db!("create_user_with_limits", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;
            transaction
                .execute(
                    "INSERT INTO users (id, username, role) VALUES ($1, $2, $3)",
                    &[&user.id.0, &user.username, &user.role.as_str()],
                )
                .await
                .map_err(map_db_error)?;
            let rows = insert_records(&transaction, &records).await?;
            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Vec<Row>, RepositoryError>(rows)
        })?;

        let created = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            user_id = %user.id,
            records = created.len(),
            "Created user with limit records"
        );
        Ok((user, created))
    }

    /// Insert a domain and its limit records in one transaction
    pub async fn create_domain_with_limits(
        &self,
        name: &str,
        synchronizer: &LimitSynchronizer,
    ) -> Result<(Domain, Vec<LimitRecord>)> {
        let domain = Domain {
            id: DomainId(Uuid::new_v4()),
            name: name.to_string(),
        };
        let records = synchronizer.plan_domain_records(&domain).await?;

        let rows = retry_db!("create_domain_with_limits", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;
            transaction
                .execute(
                    "INSERT INTO domains (id, name) VALUES ($1, $2)",
                    &[&domain.id.0, &domain.name],
                )
                .await
                .map_err(map_db_error)?;
            let rows = insert_records(&transaction, &records).await?;
            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Vec<Row>, RepositoryError>(rows)
        })?;

        let created = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            domain = %domain.name,
            records = created.len(),
            "Created domain with limit records"
        );
        Ok((domain, created))
    }

    pub async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>> {
        let row = retry_db!("find_domain_by_name", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_opt("SELECT id, name FROM domains WHERE name = $1", &[&name])
                .await
                .map_err(map_db_error)
        })?;

        Ok(row.map(|row| Domain {
            id: DomainId(row.get("id")),
            name: row.get("name"),
        }))
    }

    /// Delete a principal; its limit records and ownership rows cascade
    pub async fn delete(&self, kind: PrincipalKind, id: Uuid) -> Result<bool> {
        let statement = match kind {
            PrincipalKind::User => "DELETE FROM users WHERE id = $1",
            PrincipalKind::Domain => "DELETE FROM domains WHERE id = $1",
        };
        let deleted = retry_db!("delete_principal", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .execute(statement, &[&id])
                .await
                .map_err(map_db_error)
        })?;

        Ok(deleted > 0)
    }

    /// Identifiers of every principal of `kind`, oldest first
    pub async fn list_ids(&self, kind: PrincipalKind) -> Result<Vec<Uuid>> {
        let statement = match kind {
            PrincipalKind::User => "SELECT id FROM users ORDER BY created_at, id",
            PrincipalKind::Domain => "SELECT id FROM domains ORDER BY created_at, id",
        };
        let rows = retry_db!("list_principal_ids", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client.query(statement, &[]).await.map_err(map_db_error)
        })?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

fn row_to_user(row: &Row) -> Result<User, RepositoryError> {
    let role: String = row.get("role");
    Ok(User {
        id: UserId(row.get("id")),
        username: row.get("username"),
        role: role.parse().map_err(RepositoryError::DataConversionError)?,
    })
}
