use super::ports::{LimitError, UNLIMITED};
use super::templates::LimitTemplate;
use crate::principals::PrincipalKind;
use crate::settings::SettingsServiceTrait;
use config::ParameterValue;
use std::collections::HashMap;

/// Namespace of the limits parameters in the settings registry
pub const LIMITS_NAMESPACE: &str = "limits";

pub const ENABLE_ADMIN_LIMITS: &str = "enable_admin_limits";
pub const ENABLE_DOMAIN_LIMITS: &str = "enable_domain_limits";

/// Flag switching enforcement on for principals of `kind`
pub fn enable_flag_for(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => ENABLE_ADMIN_LIMITS,
        PrincipalKind::Domain => ENABLE_DOMAIN_LIMITS,
    }
}

/// Read a single enablement flag straight from the settings registry
pub async fn limits_enabled(
    settings: &dyn SettingsServiceTrait,
    kind: PrincipalKind,
) -> Result<bool, LimitError> {
    let key = enable_flag_for(kind);
    let value = settings
        .get_global_parameter(LIMITS_NAMESPACE, key)
        .await
        .map_err(|e| LimitError::InternalError(format!("Failed to read {key}: {e}")))?;
    parse_flag(key, value.as_ref())
}

fn parse_flag(key: &str, value: Option<&ParameterValue>) -> Result<bool, LimitError> {
    let value = value.ok_or_else(|| LimitError::MissingDefaultParameter(key.to_string()))?;
    value.as_bool().ok_or_else(|| LimitError::InvalidParameter {
        key: key.to_string(),
        reason: format!("expected a boolean, got '{value}'"),
    })
}

/// Snapshot of the `limits` namespace, taken once per operation
#[derive(Debug, Clone, Default)]
pub struct LimitsSettings {
    parameters: HashMap<String, ParameterValue>,
}

impl LimitsSettings {
    pub async fn load(settings: &dyn SettingsServiceTrait) -> Result<Self, LimitError> {
        let parameters = settings
            .get_global_parameters(LIMITS_NAMESPACE)
            .await
            .map_err(|e| LimitError::InternalError(format!("Failed to read limits settings: {e}")))?;
        Ok(Self { parameters })
    }

    pub fn from_parameters(parameters: HashMap<String, ParameterValue>) -> Self {
        Self { parameters }
    }

    pub fn limits_enabled(&self, kind: PrincipalKind) -> Result<bool, LimitError> {
        let key = enable_flag_for(kind);
        parse_flag(key, self.parameters.get(key))
    }

    /// Global default maximum for a template; a missing key is a configuration error
    pub fn default_max(&self, template: &LimitTemplate) -> Result<i32, LimitError> {
        let key = template.default_parameter_key;
        let value = self
            .parameters
            .get(key)
            .ok_or_else(|| LimitError::MissingDefaultParameter(key.to_string()))?;
        let invalid = |reason: String| LimitError::InvalidParameter {
            key: key.to_string(),
            reason,
        };
        let raw = value
            .as_int()
            .ok_or_else(|| invalid(format!("expected an integer, got '{value}'")))?;
        let max = i32::try_from(raw).map_err(|_| invalid(format!("{raw} is out of range")))?;
        if max < UNLIMITED {
            return Err(invalid(format!("{max} is below {UNLIMITED}")));
        }
        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::templates::template_for;

    fn settings(pairs: &[(&str, ParameterValue)]) -> LimitsSettings {
        LimitsSettings::from_parameters(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_flags_map_to_principal_kinds() {
        let s = settings(&[
            (ENABLE_ADMIN_LIMITS, ParameterValue::Bool(true)),
            (ENABLE_DOMAIN_LIMITS, ParameterValue::Bool(false)),
        ]);
        assert!(s.limits_enabled(PrincipalKind::User).unwrap());
        assert!(!s.limits_enabled(PrincipalKind::Domain).unwrap());
    }

    #[test]
    fn test_missing_flag_is_a_configuration_error() {
        let s = settings(&[]);
        let err = s.limits_enabled(PrincipalKind::Domain).unwrap_err();
        assert!(matches!(err, LimitError::MissingDefaultParameter(k) if k == ENABLE_DOMAIN_LIMITS));
    }

    #[test]
    fn test_default_max_values() {
        let mailboxes = template_for(PrincipalKind::User, "mailboxes").unwrap();
        let aliases = template_for(PrincipalKind::User, "mailbox_aliases").unwrap();
        let s = settings(&[
            ("deflt_user_mailboxes_limit", ParameterValue::Int(5)),
            ("deflt_user_mailbox_aliases_limit", ParameterValue::Int(-1)),
        ]);

        assert_eq!(s.default_max(mailboxes).unwrap(), 5);
        // The unlimited sentinel is kept as-is
        assert_eq!(s.default_max(aliases).unwrap(), UNLIMITED);
    }

    #[test]
    fn test_default_max_rejects_bad_values() {
        let mailboxes = template_for(PrincipalKind::User, "mailboxes").unwrap();

        let err = settings(&[]).default_max(mailboxes).unwrap_err();
        assert!(matches!(err, LimitError::MissingDefaultParameter(k) if k == "deflt_user_mailboxes_limit"));

        for bad in [
            ParameterValue::Int(-2),
            ParameterValue::Int(i64::from(i32::MAX) + 1),
            ParameterValue::Text("lots".to_string()),
            ParameterValue::Bool(true),
        ] {
            let err = settings(&[("deflt_user_mailboxes_limit", bad)])
                .default_max(mailboxes)
                .unwrap_err();
            assert!(matches!(err, LimitError::InvalidParameter { .. }));
        }
    }
}
