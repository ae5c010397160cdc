pub mod defaults;
pub mod guard;
pub mod ports;
pub mod sync;
pub mod templates;
pub mod widgets;

pub use defaults::*;
pub use ports::*;
pub use sync::LimitSynchronizer;
pub use templates::{resource_types_for, template_for, LimitTemplate};
pub use widgets::LimitWidgets;

use crate::events::{
    AdminEvent, DashboardExtensions, EventBus, EventSubscriber, EVENT_CAN_CREATE_OBJECT,
    EVENT_DOMAIN_SAVED, EVENT_PRINCIPAL_DELETED, EVENT_USER_SAVED,
};
use crate::metrics::{consts, tag, tags, MetricsServiceTrait};
use crate::principals::{LimitedPrincipal, PrincipalKind, PrincipalRef};
use crate::settings::SettingsServiceTrait;
use async_trait::async_trait;
use config::{EnforcementMode, LimitsConfig};
use guard::KeyedLocks;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure of a guarded creation: either the limit refused it or the operation failed
#[derive(Debug, thiserror::Error)]
pub enum GuardedError<E> {
    #[error(transparent)]
    Limit(LimitError),

    #[error("{0}")]
    Operation(E),
}

/// Decides whether a principal may create more objects of a resource type
///
/// Checks never mutate anything: the current value is always the live count
/// of owned objects at evaluation time.
pub struct LimitService {
    repository: Arc<dyn LimitRepository>,
    settings: Arc<dyn SettingsServiceTrait>,
    metrics: Arc<dyn MetricsServiceTrait>,
    mode: EnforcementMode,
    locks: KeyedLocks,
}

impl LimitService {
    pub fn new(
        repository: Arc<dyn LimitRepository>,
        settings: Arc<dyn SettingsServiceTrait>,
        metrics: Arc<dyn MetricsServiceTrait>,
        config: &LimitsConfig,
    ) -> Self {
        Self {
            repository,
            settings,
            metrics,
            mode: config.enforcement_mode,
            locks: KeyedLocks::new(config.lock_prune_threshold),
        }
    }

    /// Would creating `requested` more objects of `resource_type` stay within the limit?
    pub async fn check<P>(
        &self,
        principal: &P,
        resource_type: &str,
        requested: u32,
    ) -> Result<CheckOutcome, LimitError>
    where
        P: LimitedPrincipal + ?Sized,
    {
        let (principal_ref, exempt) = self.exemption(principal, resource_type).await?;
        if exempt {
            return Ok(CheckOutcome::Allowed);
        }
        let kind = principal_ref.kind;

        let start = Instant::now();
        let outcome = self
            .evaluate(principal_ref, resource_type, i64::from(requested))
            .await;
        self.record_check(kind, resource_type, start, &outcome);

        outcome
    }

    /// Principal reference of `principal` and whether its request skips enforcement
    async fn exemption<P>(
        &self,
        principal: &P,
        resource_type: &str,
    ) -> Result<(PrincipalRef, bool), LimitError>
    where
        P: LimitedPrincipal + ?Sized,
    {
        let kind: PrincipalKind = principal.principal_kind().parse()?;
        let principal_ref = PrincipalRef {
            kind,
            id: principal.principal_id(),
        };

        if !limits_enabled(self.settings.as_ref(), kind).await? {
            debug!(principal = %principal_ref, resource_type, "Limits disabled, allowing");
            return Ok((principal_ref, true));
        }
        if kind == PrincipalKind::User && principal.is_unrestricted() {
            debug!(principal = %principal_ref, resource_type, "Unrestricted actor, allowing");
            return Ok((principal_ref, true));
        }
        Ok((principal_ref, false))
    }

    fn record_check(
        &self,
        kind: PrincipalKind,
        resource_type: &str,
        start: Instant,
        outcome: &Result<CheckOutcome, LimitError>,
    ) {
        let kind_tag = tag(consts::TAG_PRINCIPAL_KIND, kind);
        let resource_tag = tag(consts::TAG_RESOURCE_TYPE, resource_type);
        let tag_refs = [kind_tag.as_str(), resource_tag.as_str()];
        self.metrics
            .record_latency(consts::METRIC_LIMIT_CHECK_DURATION, start.elapsed(), &tag_refs);
        self.metrics
            .record_count(consts::METRIC_LIMIT_CHECKS, 1, &tag_refs);
        if let Ok(CheckOutcome::LimitExceeded(_)) = outcome {
            self.metrics
                .record_count(consts::METRIC_LIMIT_EXCEEDED, 1, &tag_refs);
        }
    }

    fn missing_record(&self, principal: PrincipalRef, resource_type: &str) -> LimitError {
        warn!(
            principal = %principal,
            resource_type,
            "Limit record missing, synchronization drift"
        );
        let drift_tags = tags(&[
            (consts::TAG_PRINCIPAL_KIND, principal.kind.as_str()),
            (consts::TAG_ERROR_TYPE, consts::ERROR_TYPE_MISSING_RECORD),
        ]);
        let tag_refs: Vec<&str> = drift_tags.iter().map(String::as_str).collect();
        self.metrics
            .record_count(consts::METRIC_LIMIT_SYNC_ERRORS, 1, &tag_refs);
        LimitError::MissingLimitRecord {
            principal,
            resource_type: resource_type.to_string(),
        }
    }

    async fn evaluate(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        requested: i64,
    ) -> Result<CheckOutcome, LimitError> {
        let record = self
            .repository
            .get(principal, resource_type)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to load limit: {e}")))?
            .ok_or_else(|| self.missing_record(principal, resource_type))?;

        if record.is_unlimited() {
            return Ok(CheckOutcome::Allowed);
        }

        let current = self
            .repository
            .count_owned(principal, record.entity_type)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to count objects: {e}")))?;

        if record.is_exceeded(current, requested) {
            warn!(
                principal = %principal,
                resource_type,
                current,
                requested,
                max = record.max_value,
                "Limit reached"
            );
            return Ok(CheckOutcome::LimitExceeded(LimitExceeded {
                principal,
                resource_type: record.resource_type,
                max_value: record.max_value,
                current_value: current,
                requested,
            }));
        }

        debug!(
            principal = %principal,
            resource_type,
            current,
            requested,
            max = record.max_value,
            "Within limit"
        );
        Ok(CheckOutcome::Allowed)
    }

    /// Same as [`LimitService::check`] but a refusal becomes `LimitError::LimitExceeded`
    pub async fn ensure_allowed<P>(
        &self,
        principal: &P,
        resource_type: &str,
        requested: u32,
    ) -> Result<(), LimitError>
    where
        P: LimitedPrincipal + ?Sized,
    {
        match self.check(principal, resource_type, requested).await? {
            CheckOutcome::Allowed => Ok(()),
            CheckOutcome::LimitExceeded(exceeded) => Err(LimitError::LimitExceeded(exceeded)),
        }
    }

    /// Check the limit, then run the creation `op` only if allowed
    ///
    /// In serialized mode the check and `op` run while holding the lock for
    /// (principal, resource type), so concurrent creations in this process
    /// cannot both pass a check for the last free slot.
    pub async fn run_if_allowed<P, F, Fut, T, E>(
        &self,
        principal: &P,
        resource_type: &str,
        requested: u32,
        op: F,
    ) -> Result<T, GuardedError<E>>
    where
        P: LimitedPrincipal + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let kind = principal
            .principal_kind()
            .parse::<PrincipalKind>()
            .map_err(GuardedError::Limit)?;
        let principal_ref = PrincipalRef {
            kind,
            id: principal.principal_id(),
        };

        let _guard = match self.mode {
            EnforcementMode::Serialized => {
                Some(self.locks.acquire(principal_ref, resource_type).await)
            }
            EnforcementMode::Advisory => None,
        };

        self.ensure_allowed(principal, resource_type, requested)
            .await
            .map_err(GuardedError::Limit)?;
        op().await.map_err(GuardedError::Operation)
    }

    /// Check one creation and record `object_id` as owned, atomically in the store
    ///
    /// Unlike [`LimitService::run_if_allowed`] this holds across processes. Exempt
    /// requests (limits disabled, unrestricted actor) record the object unchecked.
    pub async fn reserve<P>(
        &self,
        principal: &P,
        resource_type: &str,
        object_id: Uuid,
    ) -> Result<CheckOutcome, LimitError>
    where
        P: LimitedPrincipal + ?Sized,
    {
        let (principal_ref, exempt) = self.exemption(principal, resource_type).await?;
        let template = template_for(principal_ref.kind, resource_type).ok_or_else(|| {
            LimitError::UnknownResourceType {
                kind: principal_ref.kind,
                resource_type: resource_type.to_string(),
            }
        })?;

        if exempt {
            self.repository
                .record_owned_object(principal_ref, template.entity_type, object_id)
                .await
                .map_err(|e| LimitError::InternalError(format!("Failed to record object: {e}")))?;
            return Ok(CheckOutcome::Allowed);
        }

        let start = Instant::now();
        let outcome = match self
            .repository
            .reserve_owned_object(principal_ref, resource_type, object_id)
            .await
        {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(self.missing_record(principal_ref, resource_type)),
            Err(e) => Err(LimitError::InternalError(format!(
                "Failed to reserve object: {e}"
            ))),
        };
        self.record_check(principal_ref.kind, resource_type, start, &outcome);

        if let Ok(CheckOutcome::LimitExceeded(exceeded)) = &outcome {
            warn!(
                principal = %principal_ref,
                resource_type,
                current = exceeded.current_value,
                max = exceeded.max_value,
                "Limit reached, reservation refused"
            );
        }
        outcome
    }

    /// Administrative update of a record's maximum
    pub async fn set_max_value(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
        max_value: i32,
    ) -> Result<LimitRecord, LimitError> {
        if template_for(principal.kind, resource_type).is_none() {
            return Err(LimitError::UnknownResourceType {
                kind: principal.kind,
                resource_type: resource_type.to_string(),
            });
        }
        if max_value < UNLIMITED {
            return Err(LimitError::InvalidMaxValue(max_value));
        }

        debug!(principal = %principal, resource_type, max_value, "Updating limit");
        self.repository
            .update_max_value(principal, resource_type, max_value)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to update limit: {e}")))?
            .ok_or_else(|| LimitError::MissingLimitRecord {
                principal,
                resource_type: resource_type.to_string(),
            })
    }

    /// Every record of a principal with its live count, in registry order
    pub async fn usages(&self, principal: PrincipalRef) -> Result<Vec<LimitUsage>, LimitError> {
        let mut records = self
            .repository
            .list_for_principal(principal)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to list limits: {e}")))?;
        let order = resource_types_for(principal.kind);
        records.sort_by_key(|r| {
            order
                .iter()
                .position(|t| t.name == r.resource_type)
                .unwrap_or(order.len())
        });

        let mut usages = Vec::with_capacity(records.len());
        for record in records {
            let current_value = self
                .repository
                .count_owned(principal, record.entity_type)
                .await
                .map_err(|e| LimitError::InternalError(format!("Failed to count objects: {e}")))?;
            usages.push(LimitUsage {
                record,
                current_value,
            });
        }
        Ok(usages)
    }
}

#[async_trait]
impl EventSubscriber for LimitService {
    fn name(&self) -> &str {
        "limits.check_object_limit"
    }

    async fn handle(&self, event: &AdminEvent) -> Result<(), LimitError> {
        match event {
            AdminEvent::CanCreateObject {
                context,
                object_type,
                count,
            } => self.ensure_allowed(context, object_type, *count).await,
            _ => Ok(()),
        }
    }
}

/// Wire the limits subsystem into the event bus and the dashboards
pub fn register_limit_handlers(
    bus: &mut EventBus,
    dashboards: &mut DashboardExtensions,
    service: Arc<LimitService>,
    synchronizer: Arc<LimitSynchronizer>,
    widgets: Arc<LimitWidgets>,
) {
    bus.subscribe(EVENT_CAN_CREATE_OBJECT, service);
    bus.subscribe(EVENT_USER_SAVED, synchronizer.clone());
    bus.subscribe(EVENT_DOMAIN_SAVED, synchronizer.clone());
    bus.subscribe(EVENT_PRINCIPAL_DELETED, synchronizer);
    dashboards.register_domain_provider(widgets.clone());
    dashboards.register_account_provider(widgets);
}
