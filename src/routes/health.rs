//! Liveness endpoint.
//!
//! Answers without touching Key Vault so it keeps working whatever the
//! identity or vault configuration is.

use crate::config::PING_RESPONSE;

/// Liveness handler.
pub async fn ping() -> &'static str {
    PING_RESPONSE
}
