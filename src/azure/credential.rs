//! Token acquisition for Key Vault.
//!
//! Two strategies are supported:
//! - **Managed identity**: the App Service local token endpoint, no secret material
//! - **Service principal**: OAuth2 client-credentials grant against Entra ID

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{
    IdentityConfig, ManagedIdentityEndpoint, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID,
    VAULT_RESOURCE, VAULT_SCOPE,
};
use crate::error::AuthenticationError;

/// Legacy MSI responses carry `expires_on` as a formatted date rather than epoch seconds
const LEGACY_EXPIRES_ON_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p %:z";

/// Short-lived bearer token for Key Vault requests.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Something that can produce a Key Vault bearer token.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short label for logs.
    fn kind(&self) -> &'static str;

    async fn get_token(&self) -> Result<AccessToken, AuthenticationError>;
}

/// Authentication strategy, resolved once at startup.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    ManagedIdentity(ManagedIdentityEndpoint),
    ServicePrincipal(ServicePrincipal),
}

/// Service principal identity triple plus the authority that issues its tokens.
#[derive(Clone)]
pub struct ServicePrincipal {
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: String,
}

impl std::fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl AuthStrategy {
    pub fn from_config(identity: &IdentityConfig) -> Self {
        if identity.managed_identity {
            AuthStrategy::ManagedIdentity(identity.managed.clone())
        } else {
            AuthStrategy::ServicePrincipal(ServicePrincipal {
                client_id: identity.client_id.clone(),
                tenant_id: identity.tenant_id.clone(),
                client_secret: identity.client_secret.clone(),
                authority_host: identity.authority_host.clone(),
            })
        }
    }

    /// Build the credential implementing this strategy.
    pub fn into_credential(self, http: reqwest::Client) -> Box<dyn TokenCredential> {
        match self {
            AuthStrategy::ManagedIdentity(endpoint) => {
                Box::new(ManagedIdentityCredential { endpoint, http })
            }
            AuthStrategy::ServicePrincipal(principal) => {
                Box::new(ClientSecretCredential { principal, http })
            }
        }
    }
}

/// App Service managed identity.
pub struct ManagedIdentityCredential {
    endpoint: ManagedIdentityEndpoint,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<Value>,
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn kind(&self) -> &'static str {
        "managed_identity"
    }

    async fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        let url = self
            .endpoint
            .endpoint
            .as_deref()
            .ok_or(AuthenticationError::MissingManagedIdentityEndpoint)?;
        let protocol = self.endpoint.protocol;

        let mut request = self.http.get(url).query(&[
            ("resource", VAULT_RESOURCE),
            ("api-version", protocol.api_version()),
        ]);
        if let Some(secret) = &self.endpoint.secret {
            request = request.header(protocol.secret_header(), secret);
        }

        let response = request.send().await.map_err(AuthenticationError::Request)?;
        let payload: ManagedIdentityTokenResponse = read_token_response(response).await?;

        Ok(AccessToken {
            token: payload.access_token,
            expires_on: payload.expires_on.as_ref().and_then(parse_expires_on),
        })
    }
}

/// Service principal with a shared secret.
pub struct ClientSecretCredential {
    principal: ServicePrincipal,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ClientCredentialsTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl ClientSecretCredential {
    fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.principal.authority_host.trim_end_matches('/'),
            tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn kind(&self) -> &'static str {
        "service_principal"
    }

    async fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        let principal = &self.principal;
        let client_id = principal
            .client_id
            .as_deref()
            .ok_or(AuthenticationError::MissingIdentity(ENV_CLIENT_ID))?;
        let tenant_id = principal
            .tenant_id
            .as_deref()
            .ok_or(AuthenticationError::MissingIdentity(ENV_TENANT_ID))?;
        let client_secret = principal
            .client_secret
            .as_deref()
            .ok_or(AuthenticationError::MissingIdentity(ENV_CLIENT_SECRET))?;

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", VAULT_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(self.token_url(tenant_id))
            .form(&params)
            .send()
            .await
            .map_err(AuthenticationError::Request)?;
        let payload: ClientCredentialsTokenResponse = read_token_response(response).await?;

        Ok(AccessToken {
            token: payload.access_token,
            expires_on: payload.expires_in.and_then(expiry_from_now),
        })
    }
}

async fn read_token_response<T>(response: reqwest::Response) -> Result<T, AuthenticationError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthenticationError::Rejected { status, body });
    }

    response
        .json()
        .await
        .map_err(|err| AuthenticationError::Parse(err.to_string()))
}

/// Absolute expiry for a relative `expires_in`; out-of-range values yield `None`.
fn expiry_from_now(secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| Utc::now().checked_add_signed(delta))
}

/// `expires_on` is epoch seconds (number or string) on current endpoints and a
/// formatted timestamp on legacy MSI.
fn parse_expires_on(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(secs) => DateTime::from_timestamp(secs, 0),
            Err(_) => DateTime::parse_from_str(s.trim(), LEGACY_EXPIRES_ON_FORMAT)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        },
        _ => None,
    }
}
