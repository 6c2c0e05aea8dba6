//! vaultpeek: read one secret from Azure Key Vault over HTTP.
//!
//! This is the application entry point. It resolves configuration from an
//! optional TOML file and the environment, initializes tracing, fixes the
//! authentication strategy, builds the Axum router and starts the HTTP server.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultpeek::azure::{AuthStrategy, SecretRetriever};
use vaultpeek::config::{AppConfig, LoggingConfig, DEFAULT_LOG_FILTER};
use vaultpeek::http::start_server;
use vaultpeek::routes::create_router;
use vaultpeek::state::AppState;

/// vaultpeek: serve one Azure Key Vault secret over HTTP
#[derive(Parser, Debug)]
#[command(name = "vaultpeek", version, about)]
struct Args {
    /// Optional path to a TOML configuration file (environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (e.g., "vaultpeek=debug")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(log_filter: &str, logging: &LoggingConfig) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(log_filter));

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration first: it selects the log format
    let config = AppConfig::from_env(args.config.as_deref())?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, &config.logging);

    tracing::info!(
        port = config.http.port,
        error_status = ?config.http.error_status,
        "Loaded configuration"
    );

    if config.vault.uri.is_none() {
        tracing::warn!("KEY_VAULT_URI is not set; requests to / will fail");
    }
    if config.vault.secret_name.is_none() {
        tracing::warn!("SECRET_NAME is not set; requests to / will fail");
    }

    // The strategy is fixed for the lifetime of the process
    let strategy = AuthStrategy::from_config(&config.identity);
    match &strategy {
        AuthStrategy::ManagedIdentity(endpoint) => {
            tracing::info!(
                protocol = ?endpoint.protocol,
                has_endpoint = endpoint.endpoint.is_some(),
                "Using managed identity"
            );
        }
        AuthStrategy::ServicePrincipal(principal) => {
            tracing::info!(
                client_id = principal.client_id.as_deref().unwrap_or("<unset>"),
                has_tenant = principal.tenant_id.is_some(),
                has_secret = principal.client_secret.is_some(),
                authority = %principal.authority_host,
                "Using service principal"
            );
        }
    }

    let http_client = reqwest::Client::builder().build()?;
    let secrets = SecretRetriever::new(strategy, &config.vault, http_client);

    let http_config = config.http.clone();
    let state = AppState::new(config, secrets);
    let app = create_router(state);

    start_server(app, &http_config).await?;

    Ok(())
}
