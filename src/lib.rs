//! vaultpeek - read one secret from Azure Key Vault over HTTP.
//!
//! `GET /` authenticates (managed identity or service principal), fetches the
//! configured secret and returns its value as plain text. `GET /ping` is a
//! liveness probe.

pub mod azure;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::*;
