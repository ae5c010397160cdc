pub mod ports;
pub use ports::*;

use async_trait::async_trait;
use config::{ParameterValue, ParametersConfig};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Settings registry backed by the loaded configuration file and environment
///
/// Administrators can change values at runtime through [`StaticSettingsService::set`];
/// readers see the change on their next call.
pub struct StaticSettingsService {
    parameters: RwLock<ParametersConfig>,
}

impl StaticSettingsService {
    pub fn new(parameters: ParametersConfig) -> Self {
        Self {
            parameters: RwLock::new(parameters),
        }
    }

    pub fn set(
        &self,
        namespace: &str,
        key: &str,
        value: ParameterValue,
    ) -> Result<(), SettingsError> {
        debug!(namespace, key, value = %value, "Updating global parameter");
        self.parameters
            .write()
            .map_err(|e| SettingsError::Unavailable(format!("Parameters lock poisoned: {e}")))?
            .set(namespace, key, value);
        Ok(())
    }
}

#[async_trait]
impl SettingsServiceTrait for StaticSettingsService {
    async fn get_global_parameter(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<ParameterValue>, SettingsError> {
        let parameters = self
            .parameters
            .read()
            .map_err(|e| SettingsError::Unavailable(format!("Parameters lock poisoned: {e}")))?;
        Ok(parameters.get(namespace, key).cloned())
    }

    async fn get_global_parameters(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, ParameterValue>, SettingsError> {
        let parameters = self
            .parameters
            .read()
            .map_err(|e| SettingsError::Unavailable(format!("Parameters lock poisoned: {e}")))?;
        Ok(parameters.namespace(namespace).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_are_visible_on_next_read() {
        let service = StaticSettingsService::new(ParametersConfig::default());

        assert_eq!(
            service
                .get_global_parameter("limits", "enable_admin_limits")
                .await
                .unwrap(),
            None
        );

        service
            .set("limits", "enable_admin_limits", ParameterValue::Bool(true))
            .unwrap();

        assert_eq!(
            service
                .get_global_parameter("limits", "enable_admin_limits")
                .await
                .unwrap(),
            Some(ParameterValue::Bool(true))
        );
        let all = service.get_global_parameters("limits").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(service.get_global_parameters("core").await.unwrap().is_empty());
    }
}
