//! Azure Key Vault secret retrieval.
//!
//! Each call to [`SecretRetriever::retrieve`] runs the full sequence:
//! 1. Obtain a bearer token with the configured [`AuthStrategy`]
//! 2. Read the configured secret from Key Vault with that token
//!
//! Nothing is cached between calls; every request authenticates and fetches anew.

pub mod credential;
pub mod vault;

use std::sync::Arc;

pub use credential::{AccessToken, AuthStrategy, TokenCredential};
pub use vault::{KeyVaultClient, SecretAttributes, SecretBundle};

use crate::config::VaultConfig;
use crate::error::{AuthenticationError, RetrievalError, SecretError};

/// Reads the configured secret on behalf of request handlers.
#[derive(Clone)]
pub struct SecretRetriever {
    credential: Arc<dyn TokenCredential>,
    vault: KeyVaultClient,
    secret_name: Option<String>,
    secret_version: String,
}

impl SecretRetriever {
    pub fn new(strategy: AuthStrategy, vault: &VaultConfig, http: reqwest::Client) -> Self {
        Self {
            credential: Arc::from(strategy.into_credential(http.clone())),
            vault: KeyVaultClient::new(http, vault.uri.clone()),
            secret_name: vault.secret_name.clone(),
            secret_version: vault.secret_version.clone(),
        }
    }

    /// Label of the active authentication strategy.
    pub fn strategy(&self) -> &'static str {
        self.credential.kind()
    }

    pub async fn authenticate(&self) -> Result<AccessToken, AuthenticationError> {
        self.credential.get_token().await
    }

    pub async fn fetch_secret(&self, token: &AccessToken) -> Result<SecretBundle, RetrievalError> {
        let name = self
            .secret_name
            .as_deref()
            .ok_or(RetrievalError::MissingSecretName)?;
        self.vault.get_secret(token, name, &self.secret_version).await
    }

    /// Authenticate, then fetch. Fetching is never attempted without a token.
    pub async fn retrieve(&self) -> Result<SecretBundle, SecretError> {
        let token = self.authenticate().await?;
        tracing::debug!(
            strategy = self.strategy(),
            expires_on = ?token.expires_on,
            "Obtained Key Vault token"
        );

        let secret = self.fetch_secret(&token).await?;
        tracing::debug!(
            version = secret.version().unwrap_or("unknown"),
            updated = ?secret.attributes.updated_at(),
            "Fetched secret"
        );

        Ok(secret)
    }
}
