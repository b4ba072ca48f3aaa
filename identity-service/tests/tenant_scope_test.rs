mod common;

use axum::http::StatusCode;
use common::{body_json, get, json, TestApp};
use identity_service::models::{Role, TenantState};
use uuid::Uuid;

#[tokio::test]
async fn test_context_reads_back_bound_scope() {
    let app = TestApp::new();
    let mut user = app.seed_member("mona@acme.test", Role::Manager);
    let department_id = Uuid::new_v4();
    user.department_id = Some(department_id);
    app.store.seed_user(user.clone());

    let response = app
        .send(get("/tenant/context", Some(&app.access_token(&user))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["tenant_id"], app.tenant.tenant_id.to_string());
    assert_eq!(body["role"], "manager");
    assert_eq!(body["department_id"], department_id.to_string());
    assert!(body["team_id"].is_null());
    assert_eq!(body["bypass_rls"], false);

    let scopes = app.store.bound_scopes();
    assert_eq!(scopes.len(), 1);
    assert!(!scopes[0].bypass);
    assert_eq!(app.store.releases(), vec![true]);
}

#[tokio::test]
async fn test_tenant_status_read_once_per_request() {
    let app = TestApp::new();
    let user = app.seed_member("eve@acme.test", Role::Employee);

    let response = app
        .send(get("/tenant/context", Some(&app.access_token(&user))))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.tenant_lookups(), 1);
}

#[tokio::test]
async fn test_failed_request_rolls_back() {
    let app = TestApp::new();
    let manager = app.seed_member("mona@acme.test", Role::Manager);

    let response = app
        .send(json(
            "PATCH",
            &format!("/users/{}", Uuid::new_v4()),
            Some(&app.access_token(&manager)),
            serde_json::json!({ "is_active": false }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.store.releases(), vec![false]);
}

#[tokio::test]
async fn test_role_gate_refuses_before_binding_scope() {
    let app = TestApp::new();
    let employee = app.seed_member("eve@acme.test", Role::Employee);

    let response = app
        .send(get("/users/search?phone=5551234567", Some(&app.access_token(&employee))))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("manager"));
    assert!(app.store.bound_scopes().is_empty());
}

#[tokio::test]
async fn test_other_tenant_rows_are_invisible() {
    let app = TestApp::new();
    let globex = app.seed_tenant("globex");
    let admin = app.seed_member("ada@acme.test", Role::TenantAdmin);
    let outsider = app.seed_user(Some(globex.tenant_id), "olga@globex.test", Role::Employee);

    let response = app
        .send(json(
            "PATCH",
            &format!("/users/{}", outsider.user_id),
            Some(&app.access_token(&admin)),
            serde_json::json!({ "is_active": false }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.store.user(outsider.user_id).unwrap().is_active);
}

#[tokio::test]
async fn test_platform_admin_reads_any_tenant_under_bypass() {
    let app = TestApp::new();
    let root = app.seed_user(None, "root@platform.test", Role::SuperAdmin);
    app.store
        .set_tenant_state(app.tenant.tenant_id, TenantState::Suspended.as_str());

    let response = app
        .send(get(
            &format!("/platform/tenants/{}", app.tenant.tenant_id),
            Some(&app.access_token(&root)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["tenant_slug"], "acme");
    assert_eq!(body["tenant_state_code"], "suspended");

    let scopes = app.store.bound_scopes();
    assert_eq!(scopes.len(), 1);
    assert!(scopes[0].bypass);
    assert_eq!(scopes[0].tenant_id, None);
}

#[tokio::test]
async fn test_platform_routes_refuse_tenant_admins() {
    let app = TestApp::new();
    let admin = app.seed_member("ada@acme.test", Role::TenantAdmin);

    let response = app
        .send(get(
            &format!("/platform/tenants/{}", app.tenant.tenant_id),
            Some(&app.access_token(&admin)),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.store.bound_scopes().is_empty());
}

#[tokio::test]
async fn test_tenant_routes_never_bypass() {
    let app = TestApp::new();
    let root = app.seed_user(None, "root@platform.test", Role::SuperAdmin);
    let member = app.seed_member("alice@acme.test", Role::Employee);

    let response = app
        .send(json(
            "PATCH",
            &format!("/users/{}", member.user_id),
            Some(&app.access_token(&root)),
            serde_json::json!({ "is_active": false }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let scopes = app.store.bound_scopes();
    assert_eq!(scopes.len(), 1);
    assert!(!scopes[0].bypass);
    assert!(app.store.user(member.user_id).unwrap().is_active);
}

#[tokio::test]
async fn test_unknown_platform_tenant_is_404() {
    let app = TestApp::new();
    let root = app.seed_user(None, "root@platform.test", Role::SuperAdmin);

    let response = app
        .send(get(
            &format!("/platform/tenants/{}", Uuid::new_v4()),
            Some(&app.access_token(&root)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
