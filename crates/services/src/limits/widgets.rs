use super::defaults::limits_enabled;
use super::ports::{LimitError, LimitUsage};
use super::LimitService;
use crate::events::{AccountWidgetProvider, DashboardWidget, DomainWidgetProvider, WidgetColumn};
use crate::principals::{Domain, PrincipalKind, PrincipalRef, User};
use crate::settings::SettingsServiceTrait;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const RESOURCES_WIDGET_TEMPLATE: &str = "limits/resources_widget.html";

/// Resource usage blocks for the domain and account dashboards
pub struct LimitWidgets {
    service: Arc<LimitService>,
    settings: Arc<dyn SettingsServiceTrait>,
}

impl LimitWidgets {
    pub fn new(service: Arc<LimitService>, settings: Arc<dyn SettingsServiceTrait>) -> Self {
        Self { service, settings }
    }

    async fn resources_widget(&self, principal: PrincipalRef) -> Result<DashboardWidget, LimitError> {
        let usages = self.service.usages(principal).await?;
        Ok(DashboardWidget {
            column: WidgetColumn::Right,
            template: RESOURCES_WIDGET_TEMPLATE.to_string(),
            context: json!({ "limits": usages.iter().map(usage_entry).collect::<Vec<_>>() }),
        })
    }
}

fn usage_entry(usage: &LimitUsage) -> serde_json::Value {
    json!({
        "resource_type": usage.record.resource_type,
        "entity_type": usage.record.entity_type,
        "max_value": usage.record.max_value,
        "current_value": usage.current_value,
        "usage_percent": usage.usage_percent(),
    })
}

#[async_trait]
impl DomainWidgetProvider for LimitWidgets {
    /// The widget is the same whoever views it; `_viewer` is not consulted
    async fn domain_widgets(
        &self,
        _viewer: &User,
        domain: &Domain,
    ) -> Result<Vec<DashboardWidget>, LimitError> {
        if !limits_enabled(self.settings.as_ref(), PrincipalKind::Domain).await? {
            return Ok(Vec::new());
        }
        Ok(vec![self.resources_widget(domain.principal_ref()).await?])
    }
}

#[async_trait]
impl AccountWidgetProvider for LimitWidgets {
    /// Shown for administrator accounts only; `_viewer` is not consulted
    async fn account_widgets(
        &self,
        _viewer: &User,
        account: &User,
    ) -> Result<Vec<DashboardWidget>, LimitError> {
        if !limits_enabled(self.settings.as_ref(), PrincipalKind::User).await?
            || !account.role.has_resource_dashboard()
        {
            return Ok(Vec::new());
        }
        Ok(vec![self.resources_widget(account.principal_ref()).await?])
    }
}
