// Configuration Management
//
// This crate handles all configuration loading for the limits subsystem.
// It provides:
// - Configuration structs and deserialization
// - File and environment loading logic
// - Default configuration values
//
// This keeps configuration concerns separate from enforcement logic.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. Tried paths: {paths}")]
    FileNotFound { paths: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Invalid environment configuration: {0}")]
    EnvError(String),
}

/// Main configuration loading interface
impl LimitsAppConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: LimitsAppConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        // Try different config locations in order
        let config_paths = ["config/config.yaml", "config.yaml", "config/default.yaml"];

        for path in &config_paths {
            if std::path::Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Err(ConfigError::FileNotFound {
            paths: config_paths.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
database:
  host: db.internal
  port: 5433
  database: modo
  username: admin
  password: secret
logging:
  level: debug
  format: json
limits:
  enforcement_mode: serialized
parameters:
  limits:
    enable_admin_limits: true
    enable_domain_limits: false
    deflt_user_mailboxes_limit: 5
    deflt_domain_domain_aliases_limit: 0
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = LimitsAppConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5433);
        // Unspecified fields fall back to defaults
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.limits.enforcement_mode, EnforcementMode::Serialized);

        let limits = config.parameters.namespace("limits").unwrap();
        assert_eq!(
            limits.get("enable_admin_limits"),
            Some(&ParameterValue::Bool(true))
        );
        assert_eq!(
            limits.get("deflt_user_mailboxes_limit"),
            Some(&ParameterValue::Int(5))
        );
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = LimitsAppConfig::load_from_file("/nonexistent/limits.yaml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }

    #[test]
    fn test_load_from_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"limits: [not, a, map").unwrap();

        let result = LimitsAppConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
