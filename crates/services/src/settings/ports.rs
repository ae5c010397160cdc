use async_trait::async_trait;
use config::ParameterValue;
use std::collections::HashMap;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings backend unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the global parameter registry
///
/// Parameters are grouped by application namespace (`limits`, `core`, ...).
/// Implementations must not cache across calls: a changed value is visible
/// to the next read.
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait SettingsServiceTrait: Send + Sync {
    async fn get_global_parameter(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<ParameterValue>, SettingsError>;

    async fn get_global_parameters(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, ParameterValue>, SettingsError>;
}
