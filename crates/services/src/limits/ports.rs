use crate::principals::{PrincipalKind, PrincipalRef};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Sentinel maximum meaning "no cap"
pub const UNLIMITED: i32 = -1;

/// Kind of object counted against a limit, identified by its natural key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CountableEntity {
    #[serde(rename = "admin.domain")]
    Domain,
    #[serde(rename = "admin.domainalias")]
    DomainAlias,
    #[serde(rename = "admin.mailbox")]
    Mailbox,
    #[serde(rename = "admin.alias")]
    MailboxAlias,
    #[serde(rename = "core.user")]
    Account,
}

impl CountableEntity {
    pub fn natural_key(&self) -> &'static str {
        match self {
            CountableEntity::Domain => "admin.domain",
            CountableEntity::DomainAlias => "admin.domainalias",
            CountableEntity::Mailbox => "admin.mailbox",
            CountableEntity::MailboxAlias => "admin.alias",
            CountableEntity::Account => "core.user",
        }
    }
}

impl FromStr for CountableEntity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin.domain" => Ok(CountableEntity::Domain),
            "admin.domainalias" => Ok(CountableEntity::DomainAlias),
            "admin.mailbox" => Ok(CountableEntity::Mailbox),
            "admin.alias" => Ok(CountableEntity::MailboxAlias),
            "core.user" => Ok(CountableEntity::Account),
            other => Err(anyhow::anyhow!("Unknown countable entity: {other}")),
        }
    }
}

impl std::fmt::Display for CountableEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.natural_key())
    }
}

/// Quota attached to one principal for one resource type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitRecord {
    pub id: Uuid,
    pub principal: PrincipalRef,
    pub resource_type: String,
    pub entity_type: CountableEntity,
    /// `0` forbids the resource entirely, `UNLIMITED` removes the cap
    pub max_value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LimitRecord {
    pub fn is_unlimited(&self) -> bool {
        self.max_value == UNLIMITED
    }

    /// Whether adding `requested` objects on top of `current` would pass the maximum
    pub fn is_exceeded(&self, current: i64, requested: i64) -> bool {
        if self.is_unlimited() {
            return false;
        }
        current.saturating_add(requested) > i64::from(self.max_value)
    }
}

/// Record to insert when a principal is created or backfilled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLimitRecord {
    pub principal: PrincipalRef,
    pub resource_type: String,
    pub entity_type: CountableEntity,
    pub max_value: i32,
}

/// A limit record together with the live count of owned objects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitUsage {
    #[serde(flatten)]
    pub record: LimitRecord,
    pub current_value: i64,
}

impl LimitUsage {
    /// Share of the maximum in use, `None` when unlimited or forbidden
    pub fn usage_percent(&self) -> Option<u8> {
        if self.record.max_value <= 0 {
            return None;
        }
        let percent = self.current_value.saturating_mul(100) / i64::from(self.record.max_value);
        Some(percent.clamp(0, 100) as u8)
    }
}

/// Details of a refused request, enough to build a user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{resource_type}: limit reached ({current_value}/{max_value} in use, {requested} requested)")]
pub struct LimitExceeded {
    pub principal: PrincipalRef,
    pub resource_type: String,
    pub max_value: i32,
    pub current_value: i64,
    pub requested: i64,
}

/// Answer of a limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Allowed,
    LimitExceeded(LimitExceeded),
}

impl CheckOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckOutcome::Allowed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    /// The only variant callers are expected to turn into a normal refusal
    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("Unknown principal kind: {0}")]
    UnknownPrincipalKind(String),

    #[error("No limit record for {principal} and resource type '{resource_type}'")]
    MissingLimitRecord {
        principal: PrincipalRef,
        resource_type: String,
    },

    #[error("Global parameter '{0}' is not configured")]
    MissingDefaultParameter(String),

    #[error("Global parameter '{key}' is invalid: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("Resource type '{resource_type}' is not registered for {kind} principals")]
    UnknownResourceType {
        kind: PrincipalKind,
        resource_type: String,
    },

    #[error("Invalid maximum value {0}: must be -1 (unlimited) or greater")]
    InvalidMaxValue(i32),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LimitError {
    /// Errors that signal a broken deployment rather than a refused request
    pub fn is_internal(&self) -> bool {
        !matches!(self, LimitError::LimitExceeded(_))
    }
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait LimitRepository: Send + Sync {
    async fn get(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
    ) -> Result<Option<LimitRecord>>;

    async fn list_for_principal(&self, principal: PrincipalRef) -> Result<Vec<LimitRecord>>;

    /// Insert all records in a single transaction; any conflict aborts the batch
    async fn create_many(&self, records: Vec<NewLimitRecord>) -> Result<Vec<LimitRecord>>;

    async fn update_max_value(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        max_value: i32,
    ) -> Result<Option<LimitRecord>>;

    /// Returns the number of records removed
    async fn delete_for_principal(&self, principal: PrincipalRef) -> Result<u64>;

    /// Live count of objects of `entity_type` owned by `principal`
    async fn count_owned(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
    ) -> Result<i64>;

    /// Record that `principal` now owns `object_id`, without any limit check
    async fn record_owned_object(
        &self,
        principal: PrincipalRef,
        entity_type: CountableEntity,
        object_id: Uuid,
    ) -> Result<()>;

    /// Check the limit and record `object_id` as one atomic step
    ///
    /// Nothing is recorded when the limit would be exceeded. `None` means the
    /// principal has no record for `resource_type`.
    async fn reserve_owned_object(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        object_id: Uuid,
    ) -> Result<Option<CheckOutcome>>;
}
