//! Typed settings for a tenantry deployment.

use crate::{ConfigError, ConfigLoader, EnvLoader, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tenantry_log::LogConfig;

/// Prefix for every tenantry environment variable.
pub const ENV_PREFIX: &str = "TENANTRY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Connection settings shared by every engine.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// How requests are mapped to tenants.
    #[serde(default)]
    pub resolution: ResolutionSettings,

    /// Defaults applied to newly created tenants.
    #[serde(default)]
    pub tenants: TenantDefaults,

    /// Optional tenant seeded at startup.
    #[serde(default)]
    pub default_tenant: DefaultTenantSettings,

    /// Logging output.
    #[serde(default)]
    pub log: LogConfig,
}

/// Connection pool settings. Each namespace gets its own pool built from
/// these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum number of connections per engine.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections per engine.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Time allowed to open a physical connection.
    #[serde(default = "default_connect_timeout", with = "seconds")]
    pub connect_timeout: Duration,

    /// Time a caller waits for a pooled connection before giving up.
    #[serde(default = "default_acquire_timeout", with = "seconds")]
    pub acquire_timeout: Duration,

    /// Idle timeout for connections.
    #[serde(default = "default_idle_timeout", with = "seconds")]
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    #[serde(default = "default_max_lifetime", with = "seconds")]
    pub max_lifetime: Duration,

    /// Enable SQLx statement logging.
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_database_url() -> String {
    "postgres://localhost/tenantry".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(10 * 60) // 10 minutes
}

fn default_max_lifetime() -> Duration {
    Duration::from_secs(30 * 60) // 30 minutes
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_database_url())
    }
}

impl DatabaseSettings {
    /// Create settings for the given database URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            acquire_timeout: default_acquire_timeout(),
            idle_timeout: default_idle_timeout(),
            max_lifetime: default_max_lifetime(),
            sqlx_logging: false,
        }
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pool acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Enable or disable SQLx logging.
    pub fn sqlx_logging(mut self, enabled: bool) -> Self {
        self.sqlx_logging = enabled;
        self
    }

    /// URL with credentials removed, for logs.
    pub fn redacted_url(&self) -> String {
        match (self.database_url.find("://"), self.database_url.rfind('@')) {
            (Some(scheme), Some(at)) if at > scheme => {
                format!("{}://***{}", &self.database_url[..scheme], &self.database_url[at..])
            }
            _ => self.database_url.clone(),
        }
    }
}

/// Request-to-tenant resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSettings {
    /// Header carrying the tenant's public identifier.
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Identifier that selects the global (public) namespace.
    #[serde(default = "default_global_marker")]
    pub global_marker: String,

    /// Fall back to the `Host` subdomain when the header is absent.
    #[serde(default = "default_true")]
    pub subdomain_fallback: bool,
}

fn default_tenant_header() -> String {
    "X-Tenant-ID".to_string()
}

fn default_global_marker() -> String {
    "api".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            tenant_header: default_tenant_header(),
            global_marker: default_global_marker(),
            subdomain_fallback: true,
        }
    }
}

/// Values applied to tenants created without explicit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDefaults {
    #[serde(default = "default_billing_tier")]
    pub billing_tier: String,
}

fn default_billing_tier() -> String {
    "basic".to_string()
}

impl Default for TenantDefaults {
    fn default() -> Self {
        Self {
            billing_tier: default_billing_tier(),
        }
    }
}

/// Tenant created during bootstrap when `enabled` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTenantSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tenant_namespace")]
    pub namespace_name: String,

    #[serde(default = "default_tenant_identifier")]
    pub public_identifier: String,

    /// Falls back to [`TenantDefaults::billing_tier`] when unset.
    #[serde(default)]
    pub billing_tier: Option<String>,
}

fn default_tenant_namespace() -> String {
    "school_alpha".to_string()
}

fn default_tenant_identifier() -> String {
    "school-alpha".to_string()
}

impl Default for DefaultTenantSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace_name: default_tenant_namespace(),
            public_identifier: default_tenant_identifier(),
            billing_tier: None,
        }
    }
}

impl TenancyConfig {
    /// Load from `.env` and the process environment.
    ///
    /// Reads `TENANTRY_*` variables. `DATABASE_URL` is honoured when
    /// `TENANTRY_DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self> {
        let loader = EnvLoader::new(Some(ENV_PREFIX.to_string()));
        let mut vars = loader.load_with_dotenv(None)?;

        if !vars.contains_key("database_url") {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                vars.insert("database_url".to_string(), url);
            }
        }

        let mut config = Self {
            log: LogConfig::from_env(),
            ..Self::default()
        };
        config.apply_vars(&vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &str) -> Result<Self> {
        let value = ConfigLoader::auto(path)?.load_file(path)?;
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply prefix-stripped, lowercased variables (see [`EnvLoader`]).
    pub fn apply_vars(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        let db = &mut self.database;

        if let Some(url) = vars.get("database_url") {
            db.database_url = url.clone();
        }
        if let Some(v) = vars.get("max_connections") {
            db.max_connections = parse_var("max_connections", v)?;
        }
        if let Some(v) = vars.get("min_connections") {
            db.min_connections = parse_var("min_connections", v)?;
        }
        if let Some(v) = vars.get("connect_timeout") {
            db.connect_timeout = Duration::from_secs(parse_var("connect_timeout", v)?);
        }
        if let Some(v) = vars.get("acquire_timeout") {
            db.acquire_timeout = Duration::from_secs(parse_var("acquire_timeout", v)?);
        }
        if let Some(v) = vars.get("idle_timeout") {
            db.idle_timeout = Duration::from_secs(parse_var("idle_timeout", v)?);
        }
        if let Some(v) = vars.get("max_lifetime") {
            db.max_lifetime = Duration::from_secs(parse_var("max_lifetime", v)?);
        }
        if let Some(v) = vars.get("sqlx_logging") {
            db.sqlx_logging = parse_bool("sqlx_logging", v)?;
        }

        if let Some(v) = vars.get("tenant_header") {
            self.resolution.tenant_header = v.clone();
        }
        if let Some(v) = vars.get("global_marker") {
            self.resolution.global_marker = v.clone();
        }
        if let Some(v) = vars.get("subdomain_fallback") {
            self.resolution.subdomain_fallback = parse_bool("subdomain_fallback", v)?;
        }

        if let Some(v) = vars.get("default_billing_tier") {
            self.tenants.billing_tier = v.clone();
        }
        if let Some(v) = vars.get("init_default_tenant") {
            self.default_tenant.enabled = parse_bool("init_default_tenant", v)?;
        }
        if let Some(v) = vars.get("default_tenant_schema") {
            self.default_tenant.namespace_name = v.clone();
        }
        if let Some(v) = vars.get("default_tenant_identifier") {
            self.default_tenant.public_identifier = v.clone();
        }

        Ok(())
    }

    /// Reject settings that cannot produce a working deployment.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;

        if db.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("database_url must not be empty".into()));
        }
        if db.max_connections == 0 {
            return Err(ConfigError::ValidationError("max_connections must be at least 1".into()));
        }
        if db.min_connections > db.max_connections {
            return Err(ConfigError::ValidationError(format!(
                "min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }
        if db.acquire_timeout.is_zero() {
            return Err(ConfigError::ValidationError("acquire_timeout must be non-zero".into()));
        }

        let header = &self.resolution.tenant_header;
        if header.is_empty() || !header.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ConfigError::ValidationError(format!("invalid tenant header name: {:?}", header)));
        }

        let marker = &self.resolution.global_marker;
        if marker.is_empty()
            || !marker.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::ValidationError(format!("invalid global marker: {:?}", marker)));
        }

        if self.tenants.billing_tier.trim().is_empty() {
            return Err(ConfigError::ValidationError("billing tier must not be empty".into()));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Durations are stored as whole seconds.
mod seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
