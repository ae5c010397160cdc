use crate::repositories::PgLimitRepository;
use services::limits::{CheckOutcome, CountableEntity, LimitRecord, NewLimitRecord};
use services::principals::PrincipalRef;
use uuid::Uuid;

/// Trait implementation adapter for PgLimitRepository
#[async_trait::async_trait]
impl services::limits::LimitRepository for PgLimitRepository {
    async fn get(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
    ) -> anyhow::Result<Option<LimitRecord>> {
        self.get(principal, resource_type).await
    }

    async fn list_for_principal(
        &self,
        principal: PrincipalRef,
    ) -> anyhow::Result<Vec<LimitRecord>> {
        self.list_for_principal(principal).await
    }

    async fn create_many(&self, records: Vec<NewLimitRecord>) -> anyhow::Result<Vec<LimitRecord>> {
        self.create_many(&records).await
    }

    async fn update_max_value(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        max_value: i32,
    ) -> anyhow::Result<Option<LimitRecord>> {
        self.update_max_value(principal, resource_type, max_value)
            .await
    }

    async fn delete_for_principal(&self, principal: PrincipalRef) -> anyhow::Result<u64> {
        self.delete_for_principal(principal).await
    }

    async fn count_owned(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
    ) -> anyhow::Result<i64> {
        self.count_owned(principal, entity_type).await
    }

    async fn record_owned_object(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
        object_id: Uuid,
    ) -> anyhow::Result<()> {
        self.record_owned_object(principal, entity_type, object_id)
            .await
    }

    async fn reserve_owned_object(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        object_id: Uuid,
    ) -> anyhow::Result<Option<CheckOutcome>> {
        self.reserve_owned_object(principal, resource_type, object_id)
            .await
    }
}
