//! Integration tests for session bootstrap and direct login.
//!
//! Run with: cargo test -p willys-integration-tests --test auth

#![allow(clippy::unwrap_used)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use secrecy::SecretString;
use willys_client::{ErrorKind, HttpLoginBootstrap, SessionCookie, WillysClient};
use willys_integration_tests::{FakeWillys, PASSWORD, USERNAME};

fn bootstrap() -> HttpLoginBootstrap {
    HttpLoginBootstrap::new(Duration::from_secs(5))
}

fn secret(s: &str) -> SecretString {
    s.to_string().into()
}

fn cookie(name: &str, domain: &str) -> SessionCookie {
    SessionCookie {
        name: name.to_string(),
        value: "v".to_string(),
        domain: domain.to_string(),
        path: "/".to_string(),
        expires: None,
        secure: false,
        http_only: true,
    }
}

// ============================================================================
// Bootstrap Tests
// ============================================================================

#[tokio::test]
async fn test_http_bootstrap_establishes_session() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();
    assert!(!client.is_authenticated());

    client
        .bootstrap(&bootstrap(), USERNAME, &secret(PASSWORD))
        .await
        .unwrap();

    assert!(client.is_authenticated());
    assert_eq!(fake.state.logins.load(Ordering::SeqCst), 1);
    assert_eq!(fake.state.csrf_fetches.load(Ordering::SeqCst), 1);

    let customer = client.customer_info().await.unwrap();
    assert_eq!(customer.customer_id, "C-1001");
    assert_eq!(customer.first_name, "Anna");
    assert!(customer.phone_number.is_empty());
    assert!(customer.plus_customer);
}

#[tokio::test]
async fn test_bootstrap_rejects_bad_password() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    let err = client
        .bootstrap(&bootstrap(), USERNAME, &secret("not-the-password"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(err.to_string().contains("invalid username or password"), "got: {err}");
    assert_eq!(fake.state.failed_logins.load(Ordering::SeqCst), 1);
    assert_eq!(fake.state.csrf_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_credentials_never_reach_the_store() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    let err = client
        .bootstrap(&bootstrap(), USERNAME, &secret("short"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.login("  ", &secret(PASSWORD)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(fake.state.requests().is_empty());
}

// ============================================================================
// Direct Login Tests
// ============================================================================

#[tokio::test]
async fn test_direct_login() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    client.login(USERNAME, &secret(PASSWORD)).await.unwrap();

    assert_eq!(fake.state.logins.load(Ordering::SeqCst), 1);
    assert_eq!(client.auth_attempts(), 0);
    let login = fake.state.requests_to("/login");
    assert_eq!(login.len(), 1);
    let body = login[0].body.as_ref().unwrap();
    assert_eq!(body["username"], USERNAME);
    // The front page is visited first for cookies.
    assert_eq!(fake.state.requests()[0].uri, "/");

    client.customer_info().await.unwrap();
}

#[tokio::test]
async fn test_direct_login_server_error_carries_body() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    fake.state.set_login_outage(Some("  maintenance window  "));
    let err = client.login(USERNAME, &secret(PASSWORD)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(
        err.to_string().contains("login failed - maintenance window"),
        "got: {err}"
    );

    fake.state.set_login_outage(Some(""));
    let err = client.login(USERNAME, &secret(PASSWORD)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(
        err.to_string()
            .contains("login failed - no additional details provided"),
        "got: {err}"
    );
    assert_eq!(fake.state.logins.load(Ordering::SeqCst), 0);

    fake.state.set_login_outage(None);
    client.login(USERNAME, &secret(PASSWORD)).await.unwrap();
}

#[tokio::test]
async fn test_customer_info_requires_session() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    let err = client.customer_info().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

// ============================================================================
// Cookie Import Tests
// ============================================================================

#[tokio::test]
async fn test_import_skips_foreign_cookies() {
    let fake = FakeWillys::start().await;
    let client = WillysClient::new(&fake.base_url()).unwrap();

    let imported = client.import_cookies(&[
        cookie("JSESSIONID", "127.0.0.1"),
        cookie("tracker", ".ads.example.com"),
        cookie("prefs", ""),
    ]);

    assert_eq!(imported, 2);
    assert!(client.is_authenticated());
}
