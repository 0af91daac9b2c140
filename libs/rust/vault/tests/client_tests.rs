//! Vault client tests against a mocked Vault HTTP API.

use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use vault_client::{LeaseRenewer, RenewalEvent, Secret, VaultClient, VaultConfig, VaultError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "s.session-token";

fn login_response(renewable: bool) -> serde_json::Value {
    json!({
        "request_id": "login-1",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "warnings": null,
        "auth": {
            "client_token": TOKEN,
            "accessor": "accessor-1",
            "policies": ["default"],
            "token_policies": ["default"],
            "metadata": { "role": "app" },
            "lease_duration": 3600,
            "renewable": renewable,
            "entity_id": "entity-1"
        }
    })
}

fn auth_secret() -> Secret {
    serde_json::from_value(login_response(true)).unwrap()
}

fn config(server: &MockServer) -> VaultConfig {
    let mut config = VaultConfig::new(server.uri(), "app").with_max_retries(0);
    config.retry_delay = Duration::from_millis(10);
    config
}

fn leased_secret() -> Secret {
    serde_json::from_value(json!({
        "request_id": "read-1",
        "lease_id": "database/creds/app/abc",
        "renewable": true,
        "lease_duration": 900,
        "data": { "username": "u", "password": "p" }
    }))
    .unwrap()
}

fn service_account_token() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "k8s-jwt").unwrap();
    file
}

#[tokio::test]
async fn test_login_uses_service_account_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/kubernetes/login"))
        .and(body_json(json!({ "role": "app", "jwt": "k8s-jwt" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_response(true)))
        .expect(1)
        .mount(&server)
        .await;

    let token_file = service_account_token();
    let config = config(&server).with_token_path(token_file.path().to_string_lossy());
    let client = VaultClient::login(config).await.unwrap();

    assert_eq!(client.role(), "app");
    assert!(client.auth_secret().is_auth());
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/kubernetes/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let token_file = service_account_token();
    let config = config(&server).with_token_path(token_file.path().to_string_lossy());
    let err = VaultClient::login(config).await.unwrap_err();

    assert!(matches!(err, VaultError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_login_missing_token_file() {
    let server = MockServer::start().await;
    let config = config(&server).with_token_path("/nonexistent/token");
    let err = VaultClient::login(config).await.unwrap_err();

    assert!(matches!(err, VaultError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_read_sends_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/my/key"))
        .and(header("X-Vault-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "read-1",
            "lease_id": "",
            "renewable": false,
            "lease_duration": 2_764_800,
            "data": { "attribute1": "value1" }
        })))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let secret = client.read("secret/my/key").await.unwrap();

    assert_eq!(secret.data["attribute1"], "value1");
    assert!(!secret.renewable);
}

#[tokio::test]
async fn test_read_missing_secret() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let err = client.read("secret/missing").await.unwrap_err();

    assert!(matches!(err, VaultError::SecretNotFound(p) if p == "secret/missing"));
}

#[tokio::test]
async fn test_read_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "k": "v" } })))
        .mount(&server)
        .await;

    let client =
        VaultClient::from_auth_secret(config(&server).with_max_retries(2), auth_secret()).unwrap();
    let secret = client.read("secret/flaky").await.unwrap();

    assert_eq!(secret.data["k"], "v");
}

#[test]
fn test_from_auth_secret_requires_token() {
    let config = VaultConfig::new("http://127.0.0.1:8200", "app");
    let err = VaultClient::from_auth_secret(config, Secret::default()).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_watch_lease_renews_until_not_renewable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .and(body_json(json!({ "lease_id": "database/creds/app/abc", "increment": 900 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_id": "database/creds/app/abc",
            "renewable": false,
            "lease_duration": 300,
            "warnings": ["TTL of \"15m\" exceeded the effective max_ttl"]
        })))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let mut handle = client.watch(&leased_secret());

    match handle.next_event().await {
        Some(RenewalEvent::Renewed(secret)) => {
            assert!(secret.has_warnings());
            assert_eq!(secret.lease_duration, 300);
        }
        other => panic!("expected renewal, got {other:?}"),
    }
    assert!(matches!(handle.next_event().await, Some(RenewalEvent::Done(None))));
}

#[tokio::test]
async fn test_watch_lease_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let mut handle = client.watch(&leased_secret());

    match handle.next_event().await {
        Some(RenewalEvent::Done(Some(err))) => assert!(err.is_no_secret_data()),
        other => panic!("expected no secret data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watch_lease_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(ResponseTemplate::new(400).set_body_string("lease not found"))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let mut handle = client.watch(&leased_secret());

    match handle.next_event().await {
        Some(RenewalEvent::Done(Some(err))) => {
            assert!(matches!(err, VaultError::LeaseRenewalFailed(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watch_auth_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .and(header("X-Vault-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_response(false)))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let mut handle = client.watch(client.auth_secret());

    assert!(matches!(handle.next_event().await, Some(RenewalEvent::Renewed(s)) if s.is_auth()));
    assert!(matches!(handle.next_event().await, Some(RenewalEvent::Done(None))));
}

#[tokio::test]
async fn test_watch_auth_token_without_auth_block() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(&server)
        .await;

    let client = VaultClient::from_auth_secret(config(&server), auth_secret()).unwrap();
    let mut handle = client.watch(client.auth_secret());

    match handle.next_event().await {
        Some(RenewalEvent::Done(Some(err))) => assert!(err.is_no_secret_data()),
        other => panic!("expected no secret data, got {other:?}"),
    }
}
