pub mod ports;
pub use ports::*;

use crate::limits::LimitError;
use crate::principals::{Domain, User};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// In-process publish/subscribe bus with explicit registration
///
/// Subscribers of an event run sequentially in registration order. The first
/// failure stops dispatch and is returned to the publisher, which must abort
/// the operation that raised the event.
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<&'static str, Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event_name: &'static str, subscriber: Arc<dyn EventSubscriber>) {
        debug!(event = event_name, subscriber = subscriber.name(), "Registering subscriber");
        self.subscribers
            .entry(event_name)
            .or_default()
            .push(subscriber);
    }

    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.subscribers.get(event_name).map_or(0, Vec::len)
    }

    pub async fn publish(&self, event: &AdminEvent) -> Result<(), EventError> {
        let event_name = event.name();
        let Some(subscribers) = self.subscribers.get(event_name) else {
            return Ok(());
        };

        for subscriber in subscribers {
            if let Err(source) = subscriber.handle(event).await {
                if source.is_internal() {
                    error!(
                        event = event_name,
                        subscriber = subscriber.name(),
                        error = %source,
                        "Event subscriber failed"
                    );
                }
                return Err(EventError::SubscriberFailed {
                    event: event_name,
                    subscriber: subscriber.name().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }
}

/// Dashboard extension points other applications contribute widgets to
#[derive(Default)]
pub struct DashboardExtensions {
    domain_providers: Vec<Arc<dyn DomainWidgetProvider>>,
    account_providers: Vec<Arc<dyn AccountWidgetProvider>>,
}

impl DashboardExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_domain_provider(&mut self, provider: Arc<dyn DomainWidgetProvider>) {
        self.domain_providers.push(provider);
    }

    pub fn register_account_provider(&mut self, provider: Arc<dyn AccountWidgetProvider>) {
        self.account_providers.push(provider);
    }

    /// Collect `extra_domain_dashboard_widgets`
    pub async fn domain_widgets(
        &self,
        viewer: &User,
        domain: &Domain,
    ) -> Result<Vec<DashboardWidget>, LimitError> {
        let mut widgets = Vec::new();
        for provider in &self.domain_providers {
            widgets.extend(provider.domain_widgets(viewer, domain).await?);
        }
        Ok(widgets)
    }

    /// Collect `extra_account_dashboard_widgets`
    pub async fn account_widgets(
        &self,
        viewer: &User,
        account: &User,
    ) -> Result<Vec<DashboardWidget>, LimitError> {
        let mut widgets = Vec::new();
        for provider in &self.account_providers {
            widgets.extend(provider.account_widgets(viewer, account).await?);
        }
        Ok(widgets)
    }
}
