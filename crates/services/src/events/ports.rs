use crate::limits::{LimitError, LimitExceeded};
use crate::principals::{Domain, Principal, PrincipalRef, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const EVENT_USER_SAVED: &str = "user_saved";
pub const EVENT_DOMAIN_SAVED: &str = "domain_saved";
pub const EVENT_PRINCIPAL_DELETED: &str = "principal_deleted";
pub const EVENT_CAN_CREATE_OBJECT: &str = "can_create_object";

/// Notifications published by the administration core
#[derive(Debug, Clone)]
pub enum AdminEvent {
    /// A user or domain was persisted; `created` is false for updates
    PrincipalSaved {
        principal: Principal,
        created: bool,
        creating_actor: Option<User>,
    },
    PrincipalDeleted { principal: PrincipalRef },
    /// Asked before `count` objects of `object_type` are created for `context`
    CanCreateObject {
        context: Principal,
        object_type: String,
        count: u32,
    },
}

impl AdminEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AdminEvent::PrincipalSaved {
                principal: Principal::User(_),
                ..
            } => EVENT_USER_SAVED,
            AdminEvent::PrincipalSaved {
                principal: Principal::Domain(_),
                ..
            } => EVENT_DOMAIN_SAVED,
            AdminEvent::PrincipalDeleted { .. } => EVENT_PRINCIPAL_DELETED,
            AdminEvent::CanCreateObject { .. } => EVENT_CAN_CREATE_OBJECT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Subscriber '{subscriber}' failed on '{event}': {source}")]
    SubscriberFailed {
        event: &'static str,
        subscriber: String,
        #[source]
        source: LimitError,
    },
}

impl EventError {
    /// The refusal carried by this error, if a subscriber vetoed because of a limit
    pub fn limit_exceeded(&self) -> Option<&LimitExceeded> {
        match self {
            EventError::SubscriberFailed {
                source: LimitError::LimitExceeded(exceeded),
                ..
            } => Some(exceeded),
            _ => None,
        }
    }

    pub fn into_limit_error(self) -> LimitError {
        match self {
            EventError::SubscriberFailed { source, .. } => source,
        }
    }
}

/// Receiver registered on the bus for one or more event names
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &AdminEvent) -> Result<(), LimitError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WidgetColumn {
    Left,
    Right,
}

/// Descriptor of an extra block rendered on a dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardWidget {
    pub column: WidgetColumn,
    pub template: String,
    pub context: serde_json::Value,
}

/// Contributes widgets to the domain dashboard (`extra_domain_dashboard_widgets`)
#[async_trait]
pub trait DomainWidgetProvider: Send + Sync {
    async fn domain_widgets(
        &self,
        viewer: &User,
        domain: &Domain,
    ) -> Result<Vec<DashboardWidget>, LimitError>;
}

/// Contributes widgets to the account dashboard (`extra_account_dashboard_widgets`)
#[async_trait]
pub trait AccountWidgetProvider: Send + Sync {
    async fn account_widgets(
        &self,
        viewer: &User,
        account: &User,
    ) -> Result<Vec<DashboardWidget>, LimitError>;
}
