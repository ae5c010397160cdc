use serde::Deserialize;
use std::{collections::HashMap, env};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitsAppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
    pub parameters: ParametersConfig,
}

impl LimitsAppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            limits: LimitsConfig::from_env()?,
            parameters: ParametersConfig::from_env(),
        })
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
    /// Enable TLS for database connections
    pub tls_enabled: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "mail_admin".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 5,
            tls_enabled: false,
        }
    }
}

impl DatabaseConfig {
    /// Create a connection URL for this database configuration
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("DATABASE_HOST").map_err(|_| "DATABASE_HOST not set")?,
            port: env::var("DATABASE_PORT")
                .map_err(|_| "DATABASE_PORT not set")?
                .parse()
                .map_err(|_| "DATABASE_PORT must be a valid port number")?,
            database: env::var("DATABASE_NAME").map_err(|_| "DATABASE_NAME not set")?,
            username: env::var("DATABASE_USERNAME").map_err(|_| "DATABASE_USERNAME not set")?,
            password: env::var("DATABASE_PASSWORD").map_err(|_| "DATABASE_PASSWORD not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| "DATABASE_MAX_CONNECTIONS must be a valid number")?,
            tls_enabled: env::var("DATABASE_TLS_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| "DATABASE_TLS_ENABLED must be true or false")?,
        })
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_DATABASE") {
            modules.insert("database".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }

    /// Build an `EnvFilter` directive string from the level and per-module overrides
    pub fn filter_directive(&self) -> String {
        let mut filter = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

/// How limit checks relate to the object creation they guard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Check is a point-in-time answer; concurrent creations may overshoot by one
    #[default]
    Advisory,
    /// Check and creation run under a per (principal, resource type) lock
    Serialized,
}

impl std::str::FromStr for EnforcementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "advisory" => Ok(EnforcementMode::Advisory),
            "serialized" => Ok(EnforcementMode::Serialized),
            other => Err(format!("Unknown enforcement mode: {other}")),
        }
    }
}

/// Limits subsystem tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub enforcement_mode: EnforcementMode,
    /// Released per-key locks are swept once this many keys are tracked
    pub lock_prune_threshold: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enforcement_mode: EnforcementMode::Advisory,
            lock_prune_threshold: 10_000,
        }
    }
}

impl LimitsConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            enforcement_mode: match env::var("LIMITS_ENFORCEMENT_MODE") {
                Ok(mode) => mode.parse()?,
                Err(_) => defaults.enforcement_mode,
            },
            lock_prune_threshold: env::var("LIMITS_LOCK_PRUNE_THRESHOLD")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| "LIMITS_LOCK_PRUNE_THRESHOLD must be a valid number")?
                .unwrap_or(defaults.lock_prune_threshold),
        })
    }
}

/// A typed global parameter value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParameterValue {
    /// Interpret a raw string (environment variable, form field) as a typed value
    pub fn parse_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return ParameterValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return ParameterValue::Bool(false);
        }
        match trimmed.parse::<i64>() {
            Ok(n) => ParameterValue::Int(n),
            Err(_) => ParameterValue::Text(raw.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{b}"),
            ParameterValue::Int(n) => write!(f, "{n}"),
            ParameterValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Prefix of environment variables carrying global parameters,
/// e.g. `PARAM_LIMITS__ENABLE_ADMIN_LIMITS=true`
pub const PARAMETER_ENV_PREFIX: &str = "PARAM_";

/// Global parameters grouped by application namespace (`limits`, `core`, ...)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ParametersConfig(pub HashMap<String, HashMap<String, ParameterValue>>);

impl ParametersConfig {
    pub fn namespace(&self, namespace: &str) -> Option<&HashMap<String, ParameterValue>> {
        self.0.get(namespace)
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&ParameterValue> {
        self.0.get(namespace).and_then(|params| params.get(key))
    }

    pub fn set(&mut self, namespace: &str, key: &str, value: ParameterValue) {
        self.0
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Load from environment variables of the form `PARAM_<NAMESPACE>__<KEY>`
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut params = Self::default();
        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(PARAMETER_ENV_PREFIX) else {
                continue;
            };
            let Some((namespace, key)) = rest.split_once("__") else {
                continue;
            };
            if namespace.is_empty() || key.is_empty() {
                continue;
            }
            params.set(
                &namespace.to_ascii_lowercase(),
                &key.to_ascii_lowercase(),
                ParameterValue::parse_raw(&raw),
            );
        }
        params
    }
}
