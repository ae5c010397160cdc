// Test utilities for services crate
#![cfg(test)]

use crate::common::RepositoryError;
use crate::limits::{
    resource_types_for, CheckOutcome, CountableEntity, LimitExceeded, LimitRecord,
    LimitRepository, NewLimitRecord, LIMITS_NAMESPACE,
};
use crate::principals::{Domain, DomainId, PrincipalKind, PrincipalRef, User, UserId, UserRole};
use crate::settings::StaticSettingsService;
use async_trait::async_trait;
use chrono::Utc;
use config::{ParameterValue, ParametersConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Limit store keeping records and owned-object counts in memory
#[derive(Default)]
pub struct InMemoryLimitRepository {
    records: Mutex<Vec<LimitRecord>>,
    owned: Mutex<HashMap<(PrincipalRef, CountableEntity), i64>>,
}

impl InMemoryLimitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owned(&self, principal: PrincipalRef, entity: CountableEntity, count: i64) {
        self.owned.lock().unwrap().insert((principal, entity), count);
    }

    pub fn records(&self) -> Vec<LimitRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_for(&self, principal: PrincipalRef) -> Vec<LimitRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.principal == principal)
            .collect()
    }
}

#[async_trait]
impl LimitRepository for InMemoryLimitRepository {
    async fn get(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
    ) -> anyhow::Result<Option<LimitRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.principal == principal && r.resource_type == resource_type)
            .cloned())
    }

    async fn list_for_principal(&self, principal: PrincipalRef) -> anyhow::Result<Vec<LimitRecord>> {
        Ok(self.records_for(principal))
    }

    async fn create_many(&self, records: Vec<NewLimitRecord>) -> anyhow::Result<Vec<LimitRecord>> {
        let mut stored = self.records.lock().unwrap();
        let now = Utc::now();
        let mut created: Vec<LimitRecord> = Vec::with_capacity(records.len());

        for new in records {
            let clash = stored
                .iter()
                .chain(created.iter())
                .any(|r| r.principal == new.principal && r.resource_type == new.resource_type);
            if clash {
                // Nothing from the batch is kept
                return Err(RepositoryError::AlreadyExists.into());
            }
            created.push(LimitRecord {
                id: Uuid::new_v4(),
                principal: new.principal,
                resource_type: new.resource_type,
                entity_type: new.entity_type,
                max_value: new.max_value,
                created_at: now,
                updated_at: now,
            });
        }

        stored.extend(created.iter().cloned());
        Ok(created)
    }

    async fn update_max_value(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        max_value: i32,
    ) -> anyhow::Result<Option<LimitRecord>> {
        let mut stored = self.records.lock().unwrap();
        Ok(stored
            .iter_mut()
            .find(|r| r.principal == principal && r.resource_type == resource_type)
            .map(|r| {
                r.max_value = max_value;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn delete_for_principal(&self, principal: PrincipalRef) -> anyhow::Result<u64> {
        let mut stored = self.records.lock().unwrap();
        let before = stored.len();
        stored.retain(|r| r.principal != principal);
        Ok((before - stored.len()) as u64)
    }

    async fn count_owned(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
    ) -> anyhow::Result<i64> {
        Ok(self
            .owned
            .lock()
            .unwrap()
            .get(&(principal, entity_type))
            .copied()
            .unwrap_or(0))
    }

    async fn record_owned_object(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
        _object_id: Uuid,
    ) -> anyhow::Result<()> {
        *self
            .owned
            .lock()
            .unwrap()
            .entry((principal, entity_type))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn reserve_owned_object(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        _object_id: Uuid,
    ) -> anyhow::Result<Option<CheckOutcome>> {
        // Both locks held together, like the row lock of the real store
        let records = self.records.lock().unwrap();
        let Some(record) = records
            .iter()
            .find(|r| r.principal == principal && r.resource_type == resource_type)
        else {
            return Ok(None);
        };
        let mut owned = self.owned.lock().unwrap();
        let current = owned.entry((principal, record.entity_type)).or_insert(0);

        if record.is_exceeded(*current, 1) {
            return Ok(Some(CheckOutcome::LimitExceeded(LimitExceeded {
                principal,
                resource_type: record.resource_type.clone(),
                max_value: record.max_value,
                current_value: *current,
                requested: 1,
            })));
        }
        *current += 1;
        Ok(Some(CheckOutcome::Allowed))
    }
}

pub fn user(role: UserRole) -> User {
    let id = Uuid::new_v4();
    User {
        id: UserId(id),
        username: format!("{}@test.com", &id.to_string()[..8]),
        role,
    }
}

pub fn domain(name: &str) -> Domain {
    Domain {
        id: DomainId(Uuid::new_v4()),
        name: name.to_string(),
    }
}

/// Limits parameters with both flags set and every default key seeded with `default_max`
pub fn limits_parameters(
    enable_admin_limits: bool,
    enable_domain_limits: bool,
    default_max: i64,
) -> ParametersConfig {
    let mut params = ParametersConfig::default();
    params.set(
        LIMITS_NAMESPACE,
        "enable_admin_limits",
        ParameterValue::Bool(enable_admin_limits),
    );
    params.set(
        LIMITS_NAMESPACE,
        "enable_domain_limits",
        ParameterValue::Bool(enable_domain_limits),
    );
    for kind in [PrincipalKind::User, PrincipalKind::Domain] {
        for template in resource_types_for(kind) {
            params.set(
                LIMITS_NAMESPACE,
                template.default_parameter_key,
                ParameterValue::Int(default_max),
            );
        }
    }
    params
}

pub fn settings_service(params: ParametersConfig) -> Arc<StaticSettingsService> {
    Arc::new(StaticSettingsService::new(params))
}
