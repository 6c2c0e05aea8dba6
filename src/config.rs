//! Configuration loading and constants.
//!
//! Configuration is resolved once at startup: an optional TOML file provides the
//! base values and environment variables override them. The resulting `AppConfig`
//! is immutable and shared with request handlers through `AppState`.

use const_format::formatcp;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

// =============================================================================
// HTTP Server Defaults
// =============================================================================

/// Listening port used when neither the config file nor `PORT` sets one
pub const DEFAULT_PORT: u16 = 3000;

/// Listening address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Body returned by the liveness endpoint
pub const PING_RESPONSE: &str = "Hello World!!!";

/// Responses carrying secret material must never be stored by intermediaries
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

/// Seconds to wait for in-flight requests after a shutdown signal
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// Azure Endpoints
// =============================================================================

/// Default Microsoft Entra ID authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Resource identifier for Key Vault tokens
pub const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// OAuth2 scope requested by the client-credentials flow
pub const VAULT_SCOPE: &str = formatcp!("{}/.default", VAULT_RESOURCE);

/// Key Vault secrets REST API version
pub const SECRETS_API_VERSION: &str = "7.4";

// =============================================================================
// Environment Variables
// =============================================================================

/// Present (and non-empty) only inside an App Service site
pub const MANAGED_IDENTITY_MARKER: &str = "APPSETTING_WEBSITE_SITE_NAME";

pub const ENV_PORT: &str = "PORT";
pub const ENV_KEY_VAULT_URI: &str = "KEY_VAULT_URI";
pub const ENV_SECRET_NAME: &str = "SECRET_NAME";
pub const ENV_SECRET_VERSION: &str = "SECRET_VERSION";
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_TENANT_ID: &str = "TENANT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub const ENV_MSI_ENDPOINT: &str = "MSI_ENDPOINT";
pub const ENV_MSI_SECRET: &str = "MSI_SECRET";
pub const ENV_ERROR_STATUS: &str = "ERROR_STATUS";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

// =============================================================================
// Logging
// =============================================================================

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "vaultpeek=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Key Vault location and the secret to read
    #[serde(default)]
    pub vault: VaultConfig,
    /// Identity used to obtain Key Vault tokens
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// How retrieval failures are reflected in the response status
    #[serde(default)]
    pub error_status: ErrorStatusMode,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            error_status: ErrorStatusMode::default(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_PORT
    }
}

/// Status code policy for failed secret lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatusMode {
    /// Always 200, with the error text as the body
    #[default]
    Compat,
    /// 401 for authentication failures, 404/502/500 for retrieval failures
    Mapped,
}

impl FromStr for ErrorStatusMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compat" => Ok(Self::Compat),
            "mapped" => Ok(Self::Mapped),
            other => Err(ConfigError::Validation(format!(
                "{ENV_ERROR_STATUS} must be \"compat\" or \"mapped\", got \"{other}\""
            ))),
        }
    }
}

/// Key Vault location and secret identifier
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    /// Vault endpoint, e.g. https://myvault.vault.azure.net
    pub uri: Option<String>,
    /// Name of the secret returned by `/`
    pub secret_name: Option<String>,
    /// Secret version; empty selects the latest version
    #[serde(default)]
    pub secret_version: String,
}

/// Identity configuration for both authentication strategies
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Use the hosting platform's managed identity instead of a service principal
    #[serde(default)]
    pub managed_identity: bool,
    /// Service principal client (application) id
    pub client_id: Option<String>,
    /// Directory (tenant) id
    pub tenant_id: Option<String>,
    /// Service principal shared secret
    pub client_secret: Option<String>,
    /// Identity authority used for the client-credentials flow
    #[serde(default = "IdentityConfig::default_authority_host")]
    pub authority_host: String,
    /// Managed identity endpoint, discovered from the platform environment
    #[serde(default)]
    pub managed: ManagedIdentityEndpoint,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            managed_identity: false,
            client_id: None,
            tenant_id: None,
            client_secret: None,
            authority_host: Self::default_authority_host(),
            managed: ManagedIdentityEndpoint::default(),
        }
    }
}

impl IdentityConfig {
    fn default_authority_host() -> String {
        DEFAULT_AUTHORITY_HOST.to_string()
    }
}

/// Local token endpoint exposed by App Service to the site's process
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagedIdentityEndpoint {
    pub endpoint: Option<String>,
    /// Value sent in the protocol's secret header
    pub secret: Option<String>,
    #[serde(default)]
    pub protocol: MsiProtocol,
}

/// App Service managed identity protocol revisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsiProtocol {
    /// IDENTITY_ENDPOINT / IDENTITY_HEADER
    #[default]
    Current,
    /// MSI_ENDPOINT / MSI_SECRET
    Legacy,
}

impl MsiProtocol {
    pub fn api_version(self) -> &'static str {
        match self {
            MsiProtocol::Current => "2019-08-01",
            MsiProtocol::Legacy => "2017-09-01",
        }
    }

    pub fn secret_header(self) -> &'static str {
        match self {
            MsiProtocol::Current => "X-IDENTITY-HEADER",
            MsiProtocol::Legacy => "secret",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Parse a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve configuration from an optional file and the process environment.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from an optional file and an environment lookup.
    ///
    /// Empty environment values are treated as unset.
    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env(key).filter(|value| !value.trim().is_empty()))?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env(ENV_PORT) {
            self.http.port = port.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{ENV_PORT} is not a valid port: \"{port}\""))
            })?;
        }
        if let Some(mode) = env(ENV_ERROR_STATUS) {
            self.http.error_status = mode.parse()?;
        }

        if let Some(uri) = env(ENV_KEY_VAULT_URI) {
            self.vault.uri = Some(uri);
        }
        if let Some(name) = env(ENV_SECRET_NAME) {
            self.vault.secret_name = Some(name);
        }
        if let Some(version) = env(ENV_SECRET_VERSION) {
            self.vault.secret_version = version;
        }

        let identity = &mut self.identity;
        if env(MANAGED_IDENTITY_MARKER).is_some() {
            identity.managed_identity = true;
        }
        if let Some(client_id) = env(ENV_CLIENT_ID) {
            identity.client_id = Some(client_id);
        }
        if let Some(tenant_id) = env(ENV_TENANT_ID) {
            identity.tenant_id = Some(tenant_id);
        }
        if let Some(secret) = env(ENV_CLIENT_SECRET) {
            identity.client_secret = Some(secret);
        }
        if let Some(host) = env(ENV_AUTHORITY_HOST) {
            identity.authority_host = host;
        }

        // Newer App Service images expose IDENTITY_*; older ones only MSI_*
        if let Some(endpoint) = env(ENV_IDENTITY_ENDPOINT) {
            identity.managed = ManagedIdentityEndpoint {
                endpoint: Some(endpoint),
                secret: env(ENV_IDENTITY_HEADER),
                protocol: MsiProtocol::Current,
            };
        } else if let Some(endpoint) = env(ENV_MSI_ENDPOINT) {
            identity.managed = ManagedIdentityEndpoint {
                endpoint: Some(endpoint),
                secret: env(ENV_MSI_SECRET),
                protocol: MsiProtocol::Legacy,
            };
        }

        if let Some(format) = env(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
