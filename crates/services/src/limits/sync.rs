use super::defaults::LimitsSettings;
use super::ports::{LimitError, LimitRecord, LimitRepository, NewLimitRecord};
use super::templates::resource_types_for;
use crate::events::{AdminEvent, EventSubscriber};
use crate::metrics::{consts, tag, MetricsServiceTrait};
use crate::principals::{Domain, Principal, PrincipalKind, PrincipalRef, User};
use crate::settings::SettingsServiceTrait;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Keeps the set of limit records in step with principal lifecycle events
///
/// Every template of a principal's kind gets exactly one record when the
/// principal is created. Maxima are resolved before anything is written, so a
/// configuration error never leaves a principal with a partial set.
pub struct LimitSynchronizer {
    repository: Arc<dyn LimitRepository>,
    settings: Arc<dyn SettingsServiceTrait>,
    metrics: Arc<dyn MetricsServiceTrait>,
}

impl LimitSynchronizer {
    pub fn new(
        repository: Arc<dyn LimitRepository>,
        settings: Arc<dyn SettingsServiceTrait>,
        metrics: Arc<dyn MetricsServiceTrait>,
    ) -> Self {
        Self {
            repository,
            settings,
            metrics,
        }
    }

    /// Records a new user receives, resolved without writing anything
    ///
    /// Users created by nobody or by a superuser inherit the global defaults.
    /// Users created by a restricted administrator start at zero everywhere.
    pub async fn plan_user_records(
        &self,
        user: &User,
        creating_actor: Option<&User>,
    ) -> Result<Vec<NewLimitRecord>, LimitError> {
        let principal = user.principal_ref();
        let records = if inherits_defaults(creating_actor) {
            let settings = LimitsSettings::load(self.settings.as_ref()).await?;
            self.resolve(principal, Some(&settings), &HashSet::new())
        } else {
            self.resolve(principal, None, &HashSet::new())
        };
        self.track(principal, records)
    }

    /// Records a new domain receives from the global domain defaults
    pub async fn plan_domain_records(
        &self,
        domain: &Domain,
    ) -> Result<Vec<NewLimitRecord>, LimitError> {
        let principal = domain.principal_ref();
        let settings = LimitsSettings::load(self.settings.as_ref()).await?;
        self.track(
            principal,
            self.resolve(principal, Some(&settings), &HashSet::new()),
        )
    }

    /// Create the user's records
    pub async fn on_user_created(
        &self,
        user: &User,
        creating_actor: Option<&User>,
    ) -> Result<Vec<LimitRecord>, LimitError> {
        let records = self.plan_user_records(user, creating_actor).await?;

        info!(
            user_id = %user.id,
            inherit_defaults = inherits_defaults(creating_actor),
            "Creating limit records for new user"
        );
        self.persist(user.principal_ref(), records).await
    }

    /// Create the domain's records from the global domain defaults
    pub async fn on_domain_created(&self, domain: &Domain) -> Result<Vec<LimitRecord>, LimitError> {
        let records = self.plan_domain_records(domain).await?;

        info!(domain = %domain.name, "Creating limit records for new domain");
        self.persist(domain.principal_ref(), records).await
    }

    /// Drop every record owned by a deleted principal
    pub async fn on_principal_deleted(&self, principal: PrincipalRef) -> Result<u64, LimitError> {
        let deleted = self
            .repository
            .delete_for_principal(principal)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to delete limits: {e}")))?;
        info!(principal = %principal, deleted, "Removed limit records");
        Ok(deleted)
    }

    /// Create the records a principal is missing, seeded from the global defaults
    ///
    /// Existing records are left untouched. Returns only the records created.
    pub async fn backfill(&self, principal: PrincipalRef) -> Result<Vec<LimitRecord>, LimitError> {
        let existing: HashSet<String> = self
            .repository
            .list_for_principal(principal)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to list limits: {e}")))?
            .into_iter()
            .map(|r| r.resource_type)
            .collect();

        if resource_types_for(principal.kind)
            .iter()
            .all(|t| existing.contains(t.name))
        {
            return Ok(Vec::new());
        }

        let settings = LimitsSettings::load(self.settings.as_ref()).await?;
        let records = self.track(principal, self.resolve(principal, Some(&settings), &existing))?;

        info!(principal = %principal, missing = records.len(), "Backfilling limit records");
        self.persist(principal, records).await
    }

    /// Build the new records, skipping `existing` resource types
    ///
    /// Without settings every maximum is zero and no default is read.
    fn resolve(
        &self,
        principal: PrincipalRef,
        settings: Option<&LimitsSettings>,
        existing: &HashSet<String>,
    ) -> Result<Vec<NewLimitRecord>, LimitError> {
        resource_types_for(principal.kind)
            .iter()
            .filter(|template| !existing.contains(template.name))
            .map(|template| {
                let max_value = match settings {
                    Some(settings) => settings.default_max(template)?,
                    None => 0,
                };
                Ok(NewLimitRecord {
                    principal,
                    resource_type: template.name.to_string(),
                    entity_type: template.entity_type,
                    max_value,
                })
            })
            .collect()
    }

    fn track<T>(
        &self,
        principal: PrincipalRef,
        result: Result<T, LimitError>,
    ) -> Result<T, LimitError> {
        if let Err(e) = &result {
            warn!(principal = %principal, error = %e, "Limit synchronization failed");
            let error_type = match e {
                LimitError::MissingDefaultParameter(_) => consts::ERROR_TYPE_MISSING_DEFAULT,
                _ => consts::ERROR_TYPE_INTERNAL_ERROR,
            };
            let kind_tag = tag(consts::TAG_PRINCIPAL_KIND, principal.kind);
            let error_tag = tag(consts::TAG_ERROR_TYPE, error_type);
            self.metrics.record_count(
                consts::METRIC_LIMIT_SYNC_ERRORS,
                1,
                &[kind_tag.as_str(), error_tag.as_str()],
            );
        }
        result
    }

    async fn persist(
        &self,
        principal: PrincipalRef,
        records: Vec<NewLimitRecord>,
    ) -> Result<Vec<LimitRecord>, LimitError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let result = self
            .repository
            .create_many(records)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to create limits: {e}")));
        let created = self.track(principal, result)?;

        let kind_tag = tag(consts::TAG_PRINCIPAL_KIND, principal.kind);
        self.metrics.record_count(
            consts::METRIC_LIMIT_RECORDS_CREATED,
            created.len() as i64,
            &[kind_tag.as_str()],
        );
        Ok(created)
    }
}

#[async_trait]
impl EventSubscriber for LimitSynchronizer {
    fn name(&self) -> &str {
        "limits.synchronizer"
    }

    async fn handle(&self, event: &AdminEvent) -> Result<(), LimitError> {
        match event {
            AdminEvent::PrincipalSaved { created: false, .. } => Ok(()),
            AdminEvent::PrincipalSaved {
                principal: Principal::User(user),
                creating_actor,
                ..
            } => self
                .on_user_created(user, creating_actor.as_ref())
                .await
                .map(|_| ()),
            AdminEvent::PrincipalSaved {
                principal: Principal::Domain(domain),
                ..
            } => self.on_domain_created(domain).await.map(|_| ()),
            AdminEvent::PrincipalDeleted { principal } => {
                self.on_principal_deleted(*principal).await.map(|_| ())
            }
            AdminEvent::CanCreateObject { .. } => Ok(()),
        }
    }
}

fn inherits_defaults(creating_actor: Option<&User>) -> bool {
    creating_actor.map_or(true, |actor| actor.is_unrestricted())
}

/// Backfill every principal of `kind` in `ids`, stopping at the first failure
pub async fn backfill_all(
    synchronizer: &LimitSynchronizer,
    kind: PrincipalKind,
    ids: impl IntoIterator<Item = uuid::Uuid>,
) -> Result<usize, LimitError> {
    let mut created = 0;
    for id in ids {
        created += synchronizer
            .backfill(PrincipalRef { kind, id })
            .await?
            .len();
    }
    Ok(created)
}
