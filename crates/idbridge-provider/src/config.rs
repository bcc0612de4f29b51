//! Identity provider configuration.
//!
//! All values are immutable once the factory has been built. Durations use
//! human-readable strings (`"15m"`, `"60s"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer_url = "https://sso.example.com/realms/staff"
//! admin_url = "https://sso.example.com/admin/realms/staff"
//! client_id = "workflow-engine"
//! client_secret = "s3cr3t"
//! user_id_attribute = "email"
//!
//! [transport]
//! tls_trust = "validate"
//! max_connections = 50
//!
//! [transport.proxy]
//! uri = "http://proxy.internal:3128"
//! username = "svc"
//! password = "proxy-secret"
//!
//! [cache]
//! enabled = true
//! max_size = 500
//! expiration = "15m"
//!
//! [login_cache]
//! enabled = true
//! max_size = 50
//! expiration = "30s"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::Encoding;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Semaphore;
use url::Url;

/// Root configuration of the identity provider.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Realm issuer URL. The token endpoint lives below it at
    /// `protocol/openid-connect/token`.
    pub issuer_url: String,

    /// Realm admin REST API base URL.
    pub admin_url: String,

    /// Service client used for the client-credentials grant and for
    /// password checks.
    pub client_id: String,

    /// Secret of the service client.
    pub client_secret: String,

    /// Backend attribute exposed as the user id.
    pub user_id_attribute: UserIdAttribute,

    /// Expose the group path (e.g. `/staff/admins`) instead of the backend
    /// group id.
    pub group_path_as_id: bool,

    /// Name of the group reported as [`GroupType::System`](crate::GroupType::System).
    pub administrator_group: Option<String>,

    /// Upper bound on list sizes requested from the backend.
    pub max_result_size: usize,

    /// Include nested sub-groups in unfiltered group queries.
    pub flatten_subgroups: bool,

    /// HTTP transport configuration.
    pub transport: TransportConfig,

    /// Cache for user and group queries.
    #[serde(
        default = "CacheConfig::directory_default",
        deserialize_with = "deserialize_directory_cache"
    )]
    pub cache: CacheConfig,

    /// Cache for password checks. Fields left out fall back to the login
    /// defaults, not to the directory defaults.
    #[serde(
        default = "CacheConfig::login_default",
        deserialize_with = "deserialize_login_cache"
    )]
    pub login_cache: CacheConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            issuer_url: "http://localhost:8080/realms/master".to_string(),
            admin_url: "http://localhost:8080/admin/realms/master".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            user_id_attribute: UserIdAttribute::default(),
            group_path_as_id: false,
            administrator_group: None,
            max_result_size: 250,
            flatten_subgroups: false,
            transport: TransportConfig::default(),
            cache: CacheConfig::directory_default(),
            login_cache: CacheConfig::login_default(),
        }
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("issuer_url", &self.issuer_url)
            .field("admin_url", &self.admin_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("user_id_attribute", &self.user_id_attribute)
            .field("group_path_as_id", &self.group_path_as_id)
            .field("administrator_group", &self.administrator_group)
            .field("max_result_size", &self.max_result_size)
            .field("flatten_subgroups", &self.flatten_subgroups)
            .field("transport", &self.transport)
            .field("cache", &self.cache)
            .field("login_cache", &self.login_cache)
            .finish()
    }
}

/// Which backend attribute becomes the user id seen by callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserIdAttribute {
    /// The backend's internal user id.
    #[default]
    Id,
    /// The login name.
    Username,
    /// The e-mail address.
    Email,
}

/// Certificate trust policy of the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsTrust {
    /// Validate certificate chains and host names.
    #[default]
    Validate,
    /// Accept any certificate for any host name.
    ///
    /// # Warning
    ///
    /// This disables TLS server authentication entirely. Use it only against
    /// test backends with self-signed certificates.
    AcceptAll,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Certificate trust policy.
    pub tls_trust: TlsTrust,

    /// Additional PEM-encoded trust anchor.
    pub ca_certificate: Option<PathBuf>,

    /// Maximum number of concurrently used connections.
    pub max_connections: usize,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a request waits for a free connection slot.
    #[serde(with = "humantime_serde")]
    pub pool_acquire_timeout: Duration,

    /// Outbound proxy.
    pub proxy: Option<ProxyConfig>,

    /// Charset used for response bodies that do not declare one.
    pub charset: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls_trust: TlsTrust::default(),
            ca_certificate: None,
            max_connections: 50,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_acquire_timeout: Duration::from_secs(30),
            proxy: None,
            charset: "UTF-8".to_string(),
        }
    }
}

impl TransportConfig {
    /// Checks the connection bound, the charset label and the proxy
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::Missing` for the
    /// first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "transport.max_connections must be > 0".to_string(),
            ));
        }

        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidValue(format!(
                "transport.max_connections must be <= {}",
                Semaphore::MAX_PERMITS
            )));
        }

        if self.charset.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "transport.charset cannot be empty".to_string(),
            ));
        }

        if Encoding::for_label(self.charset.as_bytes()).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "unknown transport.charset '{}'",
                self.charset
            )));
        }

        if let Some(proxy) = &self.proxy {
            if proxy.uri.trim().is_empty() {
                return Err(ConfigError::Missing("transport.proxy.uri".to_string()));
            }
            if proxy.password.is_some() && proxy.username.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::InvalidValue(
                    "transport.proxy.password requires transport.proxy.username".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Outbound proxy configuration.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy URI, e.g. `http://proxy.internal:3128`.
    pub uri: String,

    /// Proxy user.
    pub username: Option<String>,

    /// Proxy password. Only used together with `username`.
    pub password: Option<String>,

    /// Comma separated hosts that bypass the proxy.
    pub no_proxy: Option<String>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("no_proxy", &self.no_proxy)
            .finish()
    }
}

impl ProxyConfig {
    /// Returns the credentials when both user and password are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => Some((user, password)),
            _ => None,
        }
    }
}

/// Query cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache. A disabled cache always misses.
    pub enabled: bool,

    /// Maximum number of entries. `0` disables the cache.
    pub max_size: u64,

    /// Time-to-live measured from insertion.
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::directory_default()
    }
}

impl CacheConfig {
    /// Default policy for user and group queries.
    #[must_use]
    pub fn directory_default() -> Self {
        Self {
            enabled: true,
            max_size: 500,
            expiration: Duration::from_secs(15 * 60),
        }
    }

    /// Default policy for password checks: off, and short-lived when on.
    #[must_use]
    pub fn login_default() -> Self {
        Self {
            enabled: false,
            max_size: 50,
            expiration: Duration::from_secs(60),
        }
    }

    /// Creates an enabled policy.
    #[must_use]
    pub fn new(max_size: u64, expiration: Duration) -> Self {
        Self {
            enabled: true,
            max_size,
            expiration,
        }
    }

    /// Creates a policy that never caches.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::directory_default()
        }
    }

    /// Returns `true` if entries can actually be stored.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.max_size > 0 && !self.expiration.is_zero()
    }
}

/// Cache section as written by the user; missing fields are filled from the
/// section's own defaults.
#[derive(Deserialize)]
struct PartialCacheConfig {
    enabled: Option<bool>,
    max_size: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    expiration: Option<Duration>,
}

impl PartialCacheConfig {
    fn over(self, base: CacheConfig) -> CacheConfig {
        CacheConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            max_size: self.max_size.unwrap_or(base.max_size),
            expiration: self.expiration.unwrap_or(base.expiration),
        }
    }
}

fn deserialize_directory_cache<'de, D>(deserializer: D) -> Result<CacheConfig, D::Error>
where
    D: Deserializer<'de>,
{
    PartialCacheConfig::deserialize(deserializer).map(|p| p.over(CacheConfig::directory_default()))
}

fn deserialize_login_cache<'de, D>(deserializer: D) -> Result<CacheConfig, D::Error>
where
    D: Deserializer<'de>,
{
    PartialCacheConfig::deserialize(deserializer).map(|p| p.over(CacheConfig::login_default()))
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl IdentityConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the client id is empty, and
    /// `ConfigError::InvalidValue` if:
    /// - an endpoint URL does not parse or is not http(s)
    /// - `max_result_size` or `transport.max_connections` is zero
    /// - `transport.max_connections` exceeds the semaphore permit limit
    /// - the charset is empty or not a known encoding label
    /// - a proxy password is set without a proxy user
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("issuer_url", &self.issuer_url)?;
        validate_endpoint("admin_url", &self.admin_url)?;

        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id".to_string()));
        }

        if self.max_result_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_result_size must be > 0".to_string(),
            ));
        }

        self.transport.validate()?;

        Ok(())
    }

    /// Token endpoint of the realm.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/token",
            self.issuer_url.trim_end_matches('/')
        )
    }
}

fn validate_endpoint(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name.to_string()));
    }
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(format!("{name} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "{name} must use http or https, got '{other}'"
        ))),
    }
}

pub mod loader {
    use std::path::{Path, PathBuf};

    use config::{Config, Environment, File};

    use super::{ConfigError, IdentityConfig};

    /// Loads configuration from an optional TOML file, then applies
    /// `IDBRIDGE__*` environment overrides, then validates.
    ///
    /// Without an explicit path, `idbridge.toml` in the working directory is
    /// used when present.
    pub fn load_config(path: Option<&Path>) -> Result<IdentityConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Load(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from("idbridge.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., IDBRIDGE__TRANSPORT__MAX_CONNECTIONS=10
        builder = builder.add_source(
            Environment::with_prefix("IDBRIDGE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: IdentityConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}
