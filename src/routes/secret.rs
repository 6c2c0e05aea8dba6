//! Secret endpoint.
//!
//! Authenticates and reads the configured secret on every request. Failures
//! are rendered as the error's text; the status code follows
//! `http.error_status` and is 200 by default.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::state::AppState;

/// Body sent when the secret was read successfully.
pub fn render_secret(value: &str) -> String {
    format!("Your secret value is: {value}.")
}

#[instrument(name = "secret::index", skip(state), fields(strategy = state.secrets.strategy()))]
pub async fn index(State(state): State<AppState>) -> Response {
    match state.secrets.retrieve().await {
        Ok(secret) => render_secret(&secret.value).into_response(),
        Err(err) => {
            let status = err.status(state.config.http.error_status);
            tracing::warn!(error = %err, status = status.as_u16(), "Secret retrieval failed");
            (status, err.to_string()).into_response()
        }
    }
}
