mod common;

use axum::http::StatusCode;
use common::{body_json, cookie_value, login_request, set_cookie, set_cookies, TestApp, PASSWORD};
use identity_service::models::{Role, TenantState};

#[tokio::test]
async fn test_login_sets_cookies_and_omits_hash() {
    let app = TestApp::new();
    let user = app.seed_member("alice@acme.test", Role::Employee);

    let response = app.send(login_request("Alice@Acme.test", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let refresh = set_cookie(&response, "refresh_token").expect("refresh cookie");
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("Secure"));
    assert!(refresh.contains("SameSite=Strict"));
    assert!(refresh.contains("Path=/auth/refresh"));
    assert!(refresh.contains("Max-Age=604800"));

    let access = set_cookie(&response, "access_token").expect("access cookie");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("SameSite=Lax"));
    assert!(access.contains("Path=/"));

    let access_cookie = cookie_value(&response, "access_token").unwrap();
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["access_token"], access_cookie.as_str());
    assert_eq!(body["user"]["user_id"], user.user_id.to_string());
    assert_eq!(body["user"]["tenant_id"], app.tenant.tenant_id.to_string());
    assert!(body["user"].get("password_hash").is_none());
    assert!(!body.to_string().contains("$argon2id$"));

    assert!(app.store.user(user.user_id).unwrap().last_login_utc.is_some());
}

#[tokio::test]
async fn test_wrong_password_is_401_without_cookies() {
    let app = TestApp::new();
    app.seed_member("alice@acme.test", Role::Employee);

    let response = app.send(login_request("alice@acme.test", "not the password")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_unknown_email_matches_wrong_password() {
    let app = TestApp::new();
    app.seed_member("alice@acme.test", Role::Employee);

    let unknown = app.send(login_request("nobody@acme.test", PASSWORD)).await;
    let wrong = app.send(login_request("alice@acme.test", "nope nope")).await;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(unknown).await, body_json(wrong).await);
}

#[tokio::test]
async fn test_inactive_account_login_is_403() {
    let app = TestApp::new();
    let user = app.seed_member("alice@acme.test", Role::Employee);
    app.store.set_user_active(user.user_id, false);

    let response = app.send(login_request("alice@acme.test", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookies(&response).is_empty());
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("inactive"));
}

#[tokio::test]
async fn test_suspended_tenant_login_is_403_naming_status() {
    let app = TestApp::new();
    app.seed_member("alice@acme.test", Role::Employee);
    app.store
        .set_tenant_state(app.tenant.tenant_id, TenantState::Suspended.as_str());

    let response = app.send(login_request("alice@acme.test", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("suspended"));
}

#[tokio::test]
async fn test_malformed_and_invalid_bodies() {
    let app = TestApp::new();

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(login_request("not-an-email", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_store_failure_is_500_with_generic_body() {
    let app = TestApp::new();
    app.seed_member("alice@acme.test", Role::Employee);
    app.store.set_failing(true);

    let response = app.send(login_request("alice@acme.test", PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_json(response).await.to_string().contains("memory store"));
}
