use super::*;
use crate::mock_backend::{
    http_backend, mint_token, spawn_backend, MockBackend, GOOD_PASSWORD, GOOD_REFRESH,
};
use chrono::TimeZone;
use storage::SessionStore;

async fn manager_with(mock: MockBackend) -> TokenManager {
    let backend = http_backend(&spawn_backend(mock).await);
    TokenManager::new(Arc::new(backend), SessionStore::in_memory())
}

fn unsigned_token(claims: serde_json::Value) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other-secret")).expect("token")
}

#[test]
fn future_expiry_is_not_expired_even_with_foreign_signature() {
    let token = unsigned_token(serde_json::json!({ "exp": Utc::now().timestamp() + 600 }));
    assert!(!is_expired(&token));
}

#[test]
fn past_expiry_is_expired() {
    let token = unsigned_token(serde_json::json!({ "exp": Utc::now().timestamp() - 1 }));
    assert!(is_expired(&token));
}

#[test]
fn missing_expiry_claim_is_expired() {
    let token = unsigned_token(serde_json::json!({ "sub": "user:1" }));
    assert!(is_expired(&token));
}

#[test]
fn malformed_tokens_are_expired() {
    assert!(is_expired(""));
    assert!(is_expired("not-a-jwt"));
    assert!(is_expired("aaa.bbb.ccc"));
}

#[test]
fn expiry_is_compared_against_the_given_instant() {
    let token = unsigned_token(serde_json::json!({ "exp": 1_700_000_000 }));
    let before = Utc.timestamp_opt(1_699_999_999, 0).unwrap();
    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let after = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
    assert!(!is_expired_at(&token, before));
    assert!(!is_expired_at(&token, at));
    assert!(is_expired_at(&token, after));
}

#[tokio::test]
async fn login_stores_both_tokens_and_header_needs_no_refresh() {
    let mock = MockBackend::default();
    let manager = manager_with(mock.clone()).await;

    let message = manager
        .login(UserId(1), "asha", GOOD_PASSWORD)
        .await
        .expect("login");
    assert_eq!(message, "Login successful!");

    let session = manager.session(UserId(1)).await.expect("session");
    assert_eq!(session.refresh, GOOD_REFRESH);
    assert!(!session.access.is_empty());

    let header = manager.auth_header(UserId(1)).await.expect("header");
    assert_eq!(header.access_token(), session.access);
    assert_eq!(header.value(), format!("Bearer {}", session.access));
    assert_eq!(*mock.refresh_calls.lock().await, 0);
}

#[tokio::test]
async fn wrong_password_reports_invalid_credentials_and_stores_nothing() {
    let manager = manager_with(MockBackend::default()).await;

    let err = manager
        .login(UserId(1), "asha", "wrong")
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(err.to_string(), "Invalid credentials.");
    assert!(manager.session(UserId(1)).await.is_none());
    assert!(manager.auth_header(UserId(1)).await.is_none());
}

#[tokio::test]
async fn other_login_failures_relay_raw_text() {
    let manager = manager_with(MockBackend::default()).await;

    let err = manager
        .login(UserId(1), "asha", "server-error")
        .await
        .expect_err("must fail");
    match err {
        AuthError::Rejected(text) => assert!(text.contains("database unavailable")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_response_without_refresh_token_is_not_persisted() {
    let manager = manager_with(MockBackend::default()).await;

    let err = manager
        .login(UserId(1), "asha", "half-response")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::Rejected(_)));
    assert!(manager.session(UserId(1)).await.is_none());
}

#[tokio::test]
async fn unreachable_backend_reports_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let manager = TokenManager::new(
        Arc::new(http_backend(&format!("http://{addr}"))),
        SessionStore::in_memory(),
    );

    let err = manager
        .login(UserId(1), "asha", GOOD_PASSWORD)
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::Connection);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let mock = MockBackend::default();
    *mock.login_access_offset.lock().await = -60;
    let manager = manager_with(mock.clone()).await;
    manager
        .login(UserId(3), "asha", GOOD_PASSWORD)
        .await
        .expect("login");

    let header = manager.auth_header(UserId(3)).await.expect("header");
    assert_eq!(*mock.refresh_calls.lock().await, 1);
    assert!(!is_expired(header.access_token()));

    let refreshed = mock.refreshed_tokens.lock().await.clone();
    assert_eq!(refreshed, vec![header.access_token().to_string()]);
    assert_eq!(
        manager.session(UserId(3)).await.expect("session").access,
        header.access_token()
    );
}

#[tokio::test]
async fn failed_refresh_yields_no_header() {
    let mock = MockBackend::default();
    let backend = http_backend(&spawn_backend(mock.clone()).await);
    let mut store = SessionStore::in_memory();
    store.insert(
        UserId(4),
        Session {
            access: mint_token(-30),
            refresh: "revoked".into(),
            login_time: Utc::now(),
        },
    );
    let manager = TokenManager::new(Arc::new(backend), store);

    assert!(manager.auth_header(UserId(4)).await.is_none());
    assert_eq!(*mock.refresh_calls.lock().await, 1);
    match manager.refresh(UserId(4)).await {
        Err(AuthError::RefreshRejected(text)) => assert!(text.contains("invalid or expired")),
        other => panic!("unexpected refresh outcome: {other:?}"),
    }
}

#[tokio::test]
async fn refresh_without_session_has_no_token() {
    let manager = manager_with(MockBackend::default()).await;
    assert_eq!(
        manager.refresh(UserId(9)).await,
        Err(AuthError::NoRefreshToken)
    );
}

#[tokio::test]
async fn logout_reports_whether_a_session_existed() {
    let manager = manager_with(MockBackend::default()).await;
    manager
        .login(UserId(5), "asha", GOOD_PASSWORD)
        .await
        .expect("login");

    assert!(manager.logout(UserId(5)).await);
    assert!(!manager.logout(UserId(5)).await);
    assert!(manager.auth_header(UserId(5)).await.is_none());
}

#[tokio::test]
async fn sessions_are_flushed_to_disk_on_every_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);
    let manager = TokenManager::new(
        Arc::new(backend),
        SessionStore::open(&path).await.expect("open"),
    );

    manager
        .login(UserId(6), "asha", GOOD_PASSWORD)
        .await
        .expect("login");
    let reopened = SessionStore::open(&path).await.expect("reopen");
    assert_eq!(
        reopened.get(UserId(6)).map(|s| s.refresh.as_str()),
        Some(GOOD_REFRESH)
    );

    manager.logout(UserId(6)).await;
    assert!(SessionStore::open(&path).await.expect("reopen").is_empty());
}
