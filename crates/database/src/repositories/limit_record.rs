use crate::pool::DbPool;
use crate::repositories::utils::{map_db_error, parse_entity_type, parse_principal_kind};
use crate::retry_db;
use anyhow::{Context, Result};
use deadpool_postgres::Transaction;
use services::common::RepositoryError;
use services::limits::{
    CheckOutcome, CountableEntity, LimitExceeded, LimitRecord, NewLimitRecord,
};
use services::principals::PrincipalRef;
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, principal_kind, principal_id, resource_type, entity_type, \
                              max_value, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgLimitRepository {
    pool: DbPool,
}

impl PgLimitRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
    ) -> Result<Option<LimitRecord>> {
        let row = retry_db!("get_limit_record", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_opt(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM limit_records
                         WHERE principal_kind = $1 AND principal_id = $2 AND resource_type = $3"
                    ),
                    &[&principal.kind.as_str(), &principal.id, &resource_type],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(row.as_ref().map(row_to_record).transpose()?)
    }

    pub async fn list_for_principal(&self, principal: PrincipalRef) -> Result<Vec<LimitRecord>> {
        let rows = retry_db!("list_limit_records", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM limit_records
                         WHERE principal_kind = $1 AND principal_id = $2
                         ORDER BY created_at, resource_type"
                    ),
                    &[&principal.kind.as_str(), &principal.id],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert all records in one transaction; any failure leaves none behind
    pub async fn create_many(&self, records: &[NewLimitRecord]) -> Result<Vec<LimitRecord>> {
        let rows = retry_db!("create_limit_records", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;
            let rows = insert_records(&transaction, records).await?;
            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Vec<Row>, RepositoryError>(rows)
        })?;

        Ok(rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn update_max_value(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        max_value: i32,
    ) -> Result<Option<LimitRecord>> {
        let row = retry_db!("update_limit_max_value", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_opt(
                    &format!(
                        "UPDATE limit_records SET max_value = $4, updated_at = NOW()
                         WHERE principal_kind = $1 AND principal_id = $2 AND resource_type = $3
                         RETURNING {RECORD_COLUMNS}"
                    ),
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &resource_type,
                        &max_value,
                    ],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(row.as_ref().map(row_to_record).transpose()?)
    }

    pub async fn delete_for_principal(&self, principal: PrincipalRef) -> Result<u64> {
        let deleted = retry_db!("delete_limit_records", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .execute(
                    "DELETE FROM limit_records WHERE principal_kind = $1 AND principal_id = $2",
                    &[&principal.kind.as_str(), &principal.id],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(deleted)
    }

    /// Live count of objects of `entity_type` owned by `principal`
    pub async fn count_owned(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
    ) -> Result<i64> {
        let row = retry_db!("count_owned_objects", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .query_one(
                    "SELECT COUNT(*) FROM owned_objects
                     WHERE principal_kind = $1 AND principal_id = $2 AND entity_type = $3",
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &entity_type.natural_key(),
                    ],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(row.get("count"))
    }

    /// Record that `principal` now owns `object_id`
    pub async fn record_owned_object(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
        object_id: Uuid,
    ) -> Result<()> {
        retry_db!("record_owned_object", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .execute(
                    "INSERT INTO owned_objects (principal_kind, principal_id, entity_type, object_id)
                     VALUES ($1, $2, $3, $4)",
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &entity_type.natural_key(),
                        &object_id,
                    ],
                )
                .await
                .map_err(map_db_error)
        })?;
        Ok(())
    }

    pub async fn remove_owned_object(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
        object_id: Uuid,
    ) -> Result<bool> {
        let deleted = retry_db!("remove_owned_object", {
            let client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            client
                .execute(
                    "DELETE FROM owned_objects
                     WHERE principal_kind = $1 AND principal_id = $2
                       AND entity_type = $3 AND object_id = $4",
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &entity_type.natural_key(),
                        &object_id,
                    ],
                )
                .await
                .map_err(map_db_error)
        })?;
        Ok(deleted > 0)
    }

    /// Check the limit and record the new object atomically
    ///
    /// The limit row stays locked (`FOR UPDATE`) from the count until commit,
    /// so concurrent reservations on the same quota are serialized across
    /// processes. Nothing is written when the limit would be exceeded, and
    /// `None` is returned when the principal has no such record.
    pub async fn reserve_owned_object(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        object_id: Uuid,
    ) -> Result<Option<CheckOutcome>> {
        let outcome = retry_db!("reserve_owned_object", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;

            let Some(row) = transaction
                .query_opt(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM limit_records
                         WHERE principal_kind = $1 AND principal_id = $2 AND resource_type = $3
                         FOR UPDATE"
                    ),
                    &[&principal.kind.as_str(), &principal.id, &resource_type],
                )
                .await
                .map_err(map_db_error)?
            else {
                return Ok(None);
            };
            let record = row_to_record(&row)?;

            let current: i64 = transaction
                .query_one(
                    "SELECT COUNT(*) FROM owned_objects
                     WHERE principal_kind = $1 AND principal_id = $2 AND entity_type = $3",
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &record.entity_type.natural_key(),
                    ],
                )
                .await
                .map_err(map_db_error)?
                .get("count");

            if record.is_exceeded(current, 1) {
                debug!(principal = %principal, resource_type, current, "Reservation refused");
                return Ok(Some(CheckOutcome::LimitExceeded(LimitExceeded {
                    principal,
                    resource_type: record.resource_type,
                    max_value: record.max_value,
                    current_value: current,
                    requested: 1,
                })));
            }

            transaction
                .execute(
                    "INSERT INTO owned_objects (principal_kind, principal_id, entity_type, object_id)
                     VALUES ($1, $2, $3, $4)",
                    &[
                        &principal.kind.as_str(),
                        &principal.id,
                        &record.entity_type.natural_key(),
                        &object_id,
                    ],
                )
                .await
                .map_err(map_db_error)?;
            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Option<CheckOutcome>, RepositoryError>(Some(CheckOutcome::Allowed))
        })?;

        Ok(outcome)
    }
}

/// Insert `records` inside an open transaction, returning the stored rows
pub(crate) async fn insert_records(
    transaction: &Transaction<'_>,
    records: &[NewLimitRecord],
) -> Result<Vec<Row>, RepositoryError> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let row = transaction
            .query_one(
                &format!(
                    "INSERT INTO limit_records (
                        principal_kind, principal_id, resource_type, entity_type, max_value
                     ) VALUES ($1, $2, $3, $4, $5)
                     RETURNING {RECORD_COLUMNS}"
                ),
                &[
                    &record.principal.kind.as_str(),
                    &record.principal.id,
                    &record.resource_type,
                    &record.entity_type.natural_key(),
                    &record.max_value,
                ],
            )
            .await
            .map_err(map_db_error)?;
        rows.push(row);
    }
    Ok(rows)
}

pub(crate) fn row_to_record(row: &Row) -> Result<LimitRecord, RepositoryError> {
    let kind: String = row.get("principal_kind");
    let entity_type: String = row.get("entity_type");
    Ok(LimitRecord {
        id: row.get("id"),
        principal: PrincipalRef {
            kind: parse_principal_kind(&kind)?,
            id: row.get("principal_id"),
        },
        resource_type: row.get("resource_type"),
        entity_type: parse_entity_type(&entity_type)?,
        max_value: row.get("max_value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
