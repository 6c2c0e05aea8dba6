//! Error types for secret retrieval.
//!
//! `AuthenticationError` covers obtaining a token, `RetrievalError` covers
//! reading the secret with it. The `/` handler only ever sees `SecretError`.

use axum::http::StatusCode;

use crate::config::ErrorStatusMode;

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Managed identity endpoint is not configured (IDENTITY_ENDPOINT or MSI_ENDPOINT)")]
    MissingManagedIdentityEndpoint,

    #[error("Service principal is missing {0}")]
    MissingIdentity(&'static str),

    #[error("Identity provider rejected the request: {status} {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Failed to reach identity provider: {0}")]
    Request(reqwest::Error),

    #[error("Failed to parse token response: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Key Vault URI is not configured (KEY_VAULT_URI)")]
    MissingVaultUri,

    #[error("Secret name is not configured (SECRET_NAME)")]
    MissingSecretName,

    #[error("Key Vault rejected the credential: {status} {body}")]
    Unauthorized { status: StatusCode, body: String },

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Key Vault returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to reach Key Vault: {0}")]
    Request(reqwest::Error),

    #[error("Failed to parse secret bundle: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

impl SecretError {
    /// Response status for this failure under the given policy.
    pub fn status(&self, mode: ErrorStatusMode) -> StatusCode {
        if mode == ErrorStatusMode::Compat {
            return StatusCode::OK;
        }

        match self {
            SecretError::Authentication(_) => StatusCode::UNAUTHORIZED,
            SecretError::Retrieval(err) => match err {
                RetrievalError::NotFound(_) => StatusCode::NOT_FOUND,
                RetrievalError::MissingVaultUri | RetrievalError::MissingSecretName => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}
