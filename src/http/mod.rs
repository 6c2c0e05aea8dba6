//! HTTP server module.
//!
//! Serves plain HTTP; TLS is expected to be terminated by the hosting platform
//! or a reverse proxy. Shuts down gracefully on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
