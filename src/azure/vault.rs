//! Key Vault secrets REST client.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::azure::credential::AccessToken;
use crate::config::SECRETS_API_VERSION;
use crate::error::RetrievalError;

/// A secret value and its metadata as returned by `GET /secrets/{name}/{version}`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBundle {
    pub value: String,
    /// Full secret identifier, `{vault}/secrets/{name}/{version}`
    pub id: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: SecretAttributes,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl SecretBundle {
    /// Version segment of the secret identifier.
    pub fn version(&self) -> Option<&str> {
        self.id
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .filter(|segment| !segment.is_empty())
    }
}

impl std::fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBundle")
            .field("value", &"<redacted>")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("attributes", &self.attributes)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Secret attributes; timestamps are Unix seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretAttributes {
    pub enabled: Option<bool>,
    pub nbf: Option<i64>,
    pub exp: Option<i64>,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    pub recovery_level: Option<String>,
}

impl SecretAttributes {
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

#[derive(Clone)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    vault_uri: Option<String>,
}

impl KeyVaultClient {
    pub fn new(http: reqwest::Client, vault_uri: Option<String>) -> Self {
        Self { http, vault_uri }
    }

    fn secret_url(vault_uri: &str, name: &str, version: &str) -> String {
        format!(
            "{}/secrets/{}/{}?api-version={}",
            vault_uri.trim_end_matches('/'),
            urlencoding::encode(name),
            urlencoding::encode(version),
            SECRETS_API_VERSION
        )
    }

    /// Fetch one secret. An empty `version` selects the latest version.
    pub async fn get_secret(
        &self,
        token: &AccessToken,
        name: &str,
        version: &str,
    ) -> Result<SecretBundle, RetrievalError> {
        let vault_uri = self
            .vault_uri
            .as_deref()
            .ok_or(RetrievalError::MissingVaultUri)?;
        let url = Self::secret_url(vault_uri, name, version);

        let response = self
            .http
            .get(url)
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(RetrievalError::Request)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RetrievalError::NotFound(name.to_string())),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                let body = response.text().await.unwrap_or_default();
                Err(RetrievalError::Unauthorized { status, body })
            }
            status if status.is_success() => response
                .json()
                .await
                .map_err(|err| RetrievalError::Parse(err.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RetrievalError::Status { status, body })
            }
        }
    }
}
