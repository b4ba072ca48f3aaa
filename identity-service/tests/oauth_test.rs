mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{cookie_value, set_cookie, MockIdentityExchange, TestApp, FRONTEND_URL};
use identity_service::{
    models::Role,
    services::{pkce_challenge, ExternalIdentity},
};

const STATE: &str = "state-from-cookie";
const VERIFIER: &str = "verifier-from-cookie";

fn identity(email: &str) -> ExternalIdentity {
    ExternalIdentity {
        email: email.to_string(),
        external_id: format!("ext-{}", email),
        display_name: Some("External Person".to_string()),
    }
}

fn callback(code: &str, state: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/auth/oauth/callback?code={}&state={}", code, state))
        .header(
            header::COOKIE,
            format!("oauth_state={}; code_verifier={}", STATE, VERIFIER),
        )
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_start_sets_state_and_verifier_cookies() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .uri("/auth/oauth/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(response.status().is_redirection());

    let state = cookie_value(&response, "oauth_state").unwrap();
    let verifier = cookie_value(&response, "code_verifier").unwrap();
    assert!(set_cookie(&response, "oauth_state")
        .unwrap()
        .contains("Max-Age=300"));

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.contains(&format!("state={}", state)));
    assert!(location.contains(&format!("code_challenge={}", pkce_challenge(&verifier))));
}

#[tokio::test]
async fn test_callback_with_mismatched_state_is_rejected() {
    let exchange = MockIdentityExchange::new().with_code("good", identity("alice@acme.test"));
    let app = TestApp::build(exchange, true);

    let response = app.send(callback("good", "forged-state")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, "access_token").is_none());
}

#[tokio::test]
async fn test_callback_links_existing_account_and_clears_password() {
    let exchange = MockIdentityExchange::new().with_code("good", identity("Alice@Acme.test"));
    let app = TestApp::build(exchange, false);
    let user = app.seed_member("alice@acme.test", Role::Manager);

    let response = app.send(callback("good", STATE)).await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], FRONTEND_URL);
    assert!(cookie_value(&response, "access_token").is_some());
    assert!(cookie_value(&response, "refresh_token").is_some());
    assert!(set_cookie(&response, "oauth_state")
        .unwrap()
        .contains("Max-Age=0"));

    let stored = app.store.user(user.user_id).unwrap();
    assert_eq!(stored.external_id.as_deref(), Some("ext-Alice@Acme.test"));
    assert!(stored.password_hash.is_none());
    assert_eq!(stored.role, "manager");
}

#[tokio::test]
async fn test_callback_provisions_employee_in_default_tenant() {
    let exchange = MockIdentityExchange::new().with_code("good", identity("new@acme.test"));
    let app = TestApp::build(exchange, true);

    let response = app.send(callback("good", STATE)).await;
    assert!(response.status().is_redirection());

    let access = cookie_value(&response, "access_token").unwrap();
    let claims = app.state.jwt.validate_access_token(&access).unwrap();
    assert_eq!(claims.email, "new@acme.test");
    assert_eq!(claims.role, "employee");
    assert_eq!(claims.tenant_id, Some(app.tenant.tenant_id));
}

#[tokio::test]
async fn test_callback_without_default_tenant_is_not_registered() {
    let exchange = MockIdentityExchange::new().with_code("good", identity("new@acme.test"));
    let app = TestApp::build(exchange, false);

    let response = app.send(callback("good", STATE)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&response, "access_token").is_none());
}

#[tokio::test]
async fn test_callback_never_links_deleted_account() {
    let exchange = MockIdentityExchange::new().with_code("good", identity("gone@acme.test"));
    let app = TestApp::build(exchange, true);
    let mut user = app.seed_member("gone@acme.test", Role::Employee);
    user.deleted_utc = Some(chrono::Utc::now());
    app.store.seed_user(user.clone());

    let response = app.send(callback("good", STATE)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.store.user(user.user_id).unwrap().external_id.is_none());
}

#[tokio::test]
async fn test_callback_with_unknown_code_is_401() {
    let app = TestApp::build(MockIdentityExchange::new(), true);

    let response = app.send(callback("unknown", STATE)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
