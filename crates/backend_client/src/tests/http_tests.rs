use super::*;
use crate::mock_backend::{http_backend, spawn_backend, MockBackend, GOOD_PASSWORD, GOOD_REFRESH};
use shared::domain::Severity;

fn sample_payload(email: &str) -> RegistrationPayload {
    RegistrationPayload {
        username: shared::domain::username_from_email(email).to_string(),
        email: email.to_string(),
        password: "pw123456".into(),
        password_confirm: "pw123456".into(),
        first_name: "Asha".into(),
        last_name: "Kumar".into(),
        user_type: "user".into(),
        needs_wheelchair_access: true,
        needs_tactile_paths: false,
        needs_audio_guidance: false,
        phone_number: String::new(),
        disability_type: "none".into(),
    }
}

fn sample_report() -> Report {
    Report {
        latitude: Some(28.6139),
        longitude: Some(77.209),
        problem_type: "Broken Ramp".into(),
        disability_types: vec!["Wheelchair".into()],
        severity: Severity::High,
        description: "Ramp at gate 2 is broken.".into(),
        photo_url: None,
        status: "Active".into(),
    }
}

#[test]
fn endpoints_join_auth_routes_onto_users_base() {
    let endpoints = Endpoints::new(
        "https://backend.example/api/users",
        "https://backend.example/api/reports/",
    )
    .expect("endpoints");
    assert_eq!(
        endpoints.login.as_str(),
        "https://backend.example/api/users/auth/login/"
    );
    assert_eq!(
        endpoints.register.as_str(),
        "https://backend.example/api/users/auth/register/"
    );
    assert_eq!(
        endpoints.refresh.as_str(),
        "https://backend.example/api/users/auth/refresh/"
    );
}

#[tokio::test]
async fn register_accepts_created() {
    let mock = MockBackend::default();
    let backend = http_backend(&spawn_backend(mock.clone()).await);

    backend
        .register(&sample_payload("asha@example.org"))
        .await
        .expect("register");

    let registrations = mock.registrations.lock().await;
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0]["username"], "asha");
    assert_eq!(registrations[0]["disability_type"], "none");
    assert_eq!(registrations[0]["phone_number"], "");
}

#[tokio::test]
async fn register_surfaces_validation_payload() {
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);

    let err = backend
        .register(&sample_payload("taken@example.org"))
        .await
        .expect_err("must fail");
    match err {
        BackendError::Validation(errors) => {
            assert_eq!(errors["email"][0], "user with this email already exists.")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_returns_both_tokens() {
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);

    let tokens = backend.login("asha", GOOD_PASSWORD).await.expect("login");
    assert_eq!(tokens.refresh, GOOD_REFRESH);
    assert!(!tokens.access.is_empty());
}

#[tokio::test]
async fn login_maps_401_to_unauthorized() {
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);

    let err = backend.login("asha", "wrong").await.expect_err("must fail");
    assert!(matches!(err, BackendError::Unauthorized(_)), "{err:?}");
}

#[tokio::test]
async fn login_without_refresh_token_is_a_decode_error() {
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);

    let err = backend
        .login("asha", "half-response")
        .await
        .expect_err("must fail");
    assert!(matches!(err, BackendError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn refresh_rejects_unknown_refresh_token() {
    let mock = MockBackend::default();
    let backend = http_backend(&spawn_backend(mock.clone()).await);

    let access = backend.refresh(GOOD_REFRESH).await.expect("refresh");
    assert!(!access.is_empty());
    let err = backend.refresh("stale").await.expect_err("must fail");
    assert!(matches!(err, BackendError::Unauthorized(_)), "{err:?}");
    assert_eq!(*mock.refresh_calls.lock().await, 2);
}

#[tokio::test]
async fn submit_report_sends_bearer_header_and_json() {
    let mock = MockBackend::default();
    let backend = http_backend(&spawn_backend(mock.clone()).await);

    backend
        .submit_report(&AuthHeader::bearer("abc.def.ghi"), &sample_report())
        .await
        .expect("submit");

    let reports = mock.reports.lock().await;
    assert_eq!(reports[0].0.as_deref(), Some("Bearer abc.def.ghi"));
    assert_eq!(reports[0].1["severity"], "High");
    assert_eq!(reports[0].1["latitude"], 28.6139);
}

#[tokio::test]
async fn submit_report_relays_backend_status() {
    let backend = http_backend(&spawn_backend(MockBackend::default()).await);
    let mut report = sample_report();
    report.problem_type.clear();

    let err = backend
        .submit_report(&AuthHeader::bearer("abc"), &report)
        .await
        .expect_err("must fail");
    assert!(err.body_text().contains("may not be blank"), "{err}");
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = http_backend(&format!("http://{addr}"));
    let err = backend.login("asha", GOOD_PASSWORD).await.expect_err("must fail");
    assert!(err.is_transport(), "{err:?}");
}
