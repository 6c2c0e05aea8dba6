//! End-to-end tests for the HTTP surface.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`, while the
//! identity provider, the App Service token endpoint and Key Vault are played by
//! wiremock servers.

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::http::{header::CACHE_CONTROL, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vaultpeek::azure::{AuthStrategy, SecretRetriever};
use vaultpeek::config::AppConfig;
use vaultpeek::routes::create_router;
use vaultpeek::state::AppState;

const TENANT: &str = "tenant-1";
const SECRET_NAME: &str = "app-secret";
const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";
const SECRET_PATH: &str = "/secrets/app-secret/";

fn app_from_env(vars: &[(&str, String)]) -> Router {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let config = AppConfig::from_sources(None, |key| vars.get(key).cloned()).unwrap();
    let strategy = AuthStrategy::from_config(&config.identity);
    let secrets = SecretRetriever::new(strategy, &config.vault, reqwest::Client::new());
    create_router(AppState::new(config, secrets))
}

/// Service principal environment pointing both Entra ID and Key Vault at `server`.
fn service_principal_env(server: &MockServer) -> Vec<(&'static str, String)> {
    vec![
        ("CLIENT_ID", "abc".to_string()),
        ("TENANT_ID", TENANT.to_string()),
        ("CLIENT_SECRET", "s3cr3t".to_string()),
        ("AZURE_AUTHORITY_HOST", server.uri()),
        ("KEY_VAULT_URI", server.uri()),
        ("SECRET_NAME", SECRET_NAME.to_string()),
    ]
}

async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_id=abc"))
        .and(body_string_contains("client_secret=s3cr3t"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=https%3A%2F%2Fvault.azure.net%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": token,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_secret(server: &MockServer, token: &str, value: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": value,
            "id": format!("{}/secrets/{SECRET_NAME}/4387e9f3d6e14c459867679a90fd0f79", server.uri()),
            "attributes": {"enabled": true, "created": 1493938410, "updated": 1493938410},
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn ping_ignores_environment() {
    let (status, _, body) = get(app_from_env(&[]), "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World!!!");

    let app = app_from_env(&[
        ("APPSETTING_WEBSITE_SITE_NAME", "site".to_string()),
        ("KEY_VAULT_URI", "http://127.0.0.1:9".to_string()),
    ]);
    let (status, _, body) = get(app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World!!!");
}

#[tokio::test]
async fn service_principal_returns_secret_value() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 1).await;
    mount_secret(&server, "sp-token", "hunter2", 1).await;

    let (status, headers, body) = get(app_from_env(&service_principal_env(&server)), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Your secret value is: hunter2.");
    assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
    assert!(headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn authentication_failure_is_reported_with_200() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_secret(&server, "never-issued", "hunter2", 0).await;

    let (status, _, body) = get(app_from_env(&service_principal_env(&server)), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Identity provider rejected the request: 401"));
    assert!(body.contains("invalid_client"));
    assert!(!body.starts_with("Your secret value is"));
}

#[tokio::test]
async fn authentication_failure_maps_to_401_when_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("AADSTS7000215"))
        .mount(&server)
        .await;

    let mut env = service_principal_env(&server);
    env.push(("ERROR_STATUS", "mapped".to_string()));
    let (status, headers, body) = get(app_from_env(&env), "/").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("AADSTS7000215"));
    assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn managed_identity_never_uses_service_principal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/msi/token"))
        .and(query_param("resource", "https://vault.azure.net"))
        .and(query_param("api-version", "2019-08-01"))
        .and(header("x-identity-header", "platform-header"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mi-token",
            "expires_on": "1586984735",
            "resource": "https://vault.azure.net",
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/oauth2/v2\.0/token$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_secret(&server, "mi-token", "from-msi", 1).await;

    let mut env = service_principal_env(&server);
    env.push(("APPSETTING_WEBSITE_SITE_NAME", "my-site".to_string()));
    env.push(("IDENTITY_ENDPOINT", format!("{}/msi/token", server.uri())));
    env.push(("IDENTITY_HEADER", "platform-header".to_string()));

    let (status, _, body) = get(app_from_env(&env), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Your secret value is: from-msi.");
}

#[tokio::test]
async fn legacy_msi_endpoint_uses_secret_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MSI_ENDPOINT"))
        .and(query_param("api-version", "2017-09-01"))
        .and(header("secret", "legacy-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "legacy-token",
            "expires_on": "09/14/2017 03:12:45 PM +00:00",
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_secret(&server, "legacy-token", "old-school", 1).await;

    let app = app_from_env(&[
        ("APPSETTING_WEBSITE_SITE_NAME", "my-site".to_string()),
        ("MSI_ENDPOINT", format!("{}/MSI_ENDPOINT", server.uri())),
        ("MSI_SECRET", "legacy-secret".to_string()),
        ("KEY_VAULT_URI", server.uri()),
        ("SECRET_NAME", SECRET_NAME.to_string()),
    ]);

    let (_, _, body) = get(app, "/").await;
    assert_eq!(body, "Your secret value is: old-school.");
}

#[tokio::test]
async fn every_request_authenticates_and_fetches_again() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 3).await;
    mount_secret(&server, "sp-token", "hunter2", 3).await;

    let app = app_from_env(&service_principal_env(&server));
    for _ in 0..3 {
        let (_, _, body) = get(app.clone(), "/").await;
        assert_eq!(body, "Your secret value is: hunter2.");
    }
}

#[tokio::test]
async fn missing_secret_is_404_only_in_mapped_mode() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 2).await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "SecretNotFound", "message": "A secret with (name/id) app-secret was not found in this key vault."}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (status, _, body) = get(app_from_env(&service_principal_env(&server)), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Secret not found: app-secret");

    let mut env = service_principal_env(&server);
    env.push(("ERROR_STATUS", "mapped".to_string()));
    let (status, _, _) = get(app_from_env(&env), "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forbidden_vault_is_a_retrieval_error() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 1).await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let mut env = service_principal_env(&server);
    env.push(("ERROR_STATUS", "mapped".to_string()));
    let (status, _, body) = get(app_from_env(&env), "/").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.starts_with("Key Vault rejected the credential: 403"));
}

#[tokio::test]
async fn missing_vault_uri_fails_after_authentication() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 1).await;

    let env: Vec<_> = service_principal_env(&server)
        .into_iter()
        .filter(|(key, _)| *key != "KEY_VAULT_URI")
        .collect();
    let (status, _, body) = get(app_from_env(&env), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Key Vault URI is not configured (KEY_VAULT_URI)");
}

#[tokio::test]
async fn out_of_range_token_lifetime_still_returns_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": i64::MAX,
            "access_token": "sp-token",
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_secret(&server, "sp-token", "hunter2", 1).await;

    let (status, _, body) = get(app_from_env(&service_principal_env(&server)), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Your secret value is: hunter2.");
}

#[tokio::test]
async fn unreachable_identity_provider_is_an_authentication_error() {
    let server = MockServer::start().await;
    mount_secret(&server, "never-issued", "hunter2", 0).await;

    // Nothing listens on the discard port
    let mut env: Vec<_> = service_principal_env(&server)
        .into_iter()
        .filter(|(key, _)| *key != "AZURE_AUTHORITY_HOST")
        .collect();
    env.push(("AZURE_AUTHORITY_HOST", "http://127.0.0.1:9".to_string()));
    env.push(("ERROR_STATUS", "mapped".to_string()));

    let (status, _, body) = get(app_from_env(&env), "/").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.starts_with("Failed to reach identity provider"));
}

#[tokio::test]
async fn vault_server_error_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    mount_token(&server, "sp-token", 2).await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("InternalServerError"))
        .expect(2)
        .mount(&server)
        .await;

    let (status, _, body) = get(app_from_env(&service_principal_env(&server)), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Key Vault returned 500"));
    assert!(body.contains("InternalServerError"));

    let mut env = service_principal_env(&server);
    env.push(("ERROR_STATUS", "mapped".to_string()));
    let (status, _, _) = get(app_from_env(&env), "/").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
