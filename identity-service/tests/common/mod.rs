//! Shared setup for identity-service integration tests.
//!
//! Builds an `AppState` over the in-process `MemoryStore` and a mock identity
//! exchange, and drives the router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, JwtConfig, OAuthConfig, RateLimitConfig,
        SecurityConfig,
    },
    models::{Role, Tenant, User},
    services::{
        AuthService, ExternalIdentity, IdentityExchange, JwtService, MemoryStore, ServiceError,
        TenantScopePropagator, TokenClass, UserService,
    },
    utils::{CredentialHasher, FieldCipher, Password},
    AppState,
};
use secrecy::Secret;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery staple";
pub const FRONTEND_URL: &str = "http://localhost:3000/app";

pub fn test_config(default_tenant_id: Option<Uuid>) -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new("postgres://localhost/identity_test".to_string()),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            signing_secret: Secret::new("integration-test-signing-secret-0123456789".to_string()),
            issuer: "identity-service".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_minutes: 10080,
        },
        security: SecurityConfig {
            pepper: Secret::new("integration-test-pepper".to_string()),
            field_encryption_key: Secret::new("integration-test-field-key".to_string()),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            cookie_secure: true,
        },
        oauth: OAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: Secret::new("test-client-secret".to_string()),
            authorize_url: "https://provider.test/authorize".to_string(),
            token_url: "https://provider.test/token".to_string(),
            userinfo_url: "https://provider.test/userinfo".to_string(),
            redirect_uri: "http://localhost:8080/auth/oauth/callback".to_string(),
            frontend_url: FRONTEND_URL.to_string(),
            default_tenant_id,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
        },
    }
}

/// Identity exchange backed by a fixed code table.
#[derive(Default)]
pub struct MockIdentityExchange {
    identities: Mutex<HashMap<String, ExternalIdentity>>,
}

impl MockIdentityExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(self, code: &str, identity: ExternalIdentity) -> Self {
        self.identities
            .lock()
            .unwrap()
            .insert(code.to_string(), identity);
        self
    }
}

#[async_trait]
impl IdentityExchange for MockIdentityExchange {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://provider.test/authorize?state={}&code_challenge={}",
            state, code_challenge
        )
    }

    async fn exchange(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<ExternalIdentity, ServiceError> {
        self.identities
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or(ServiceError::InvalidCredentials)
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub state: AppState,
    pub router: Router,
    pub tenant: Tenant,
    pub hasher: CredentialHasher,
    pub cipher: FieldCipher,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(MockIdentityExchange::new(), false)
    }

    /// `provision_default` routes first-time external sign-ins to the seeded tenant.
    pub fn build(exchange: MockIdentityExchange, provision_default: bool) -> Self {
        let store = MemoryStore::new();
        let tenant = store.seed_tenant(Tenant::new("acme".to_string(), "Acme Corp".to_string()));

        let config = test_config(provision_default.then_some(tenant.tenant_id));
        let jwt = JwtService::new(&config.jwt).unwrap();
        let hasher = CredentialHasher::new(config.security.pepper.clone()).unwrap();
        let cipher = FieldCipher::new(&config.security.field_encryption_key).unwrap();
        let shared = Arc::new(store.clone());

        let state = AppState {
            config: config.clone(),
            credentials: shared.clone(),
            jwt: jwt.clone(),
            auth_service: AuthService::new(shared.clone(), shared.clone(), jwt, hasher.clone()),
            user_service: UserService::new(hasher.clone(), cipher.clone()),
            propagator: TenantScopePropagator::new(shared.clone(), shared),
            exchange: Arc::new(exchange),
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
        };
        let router = build_router(state.clone());

        Self {
            store,
            state,
            router,
            tenant,
            hasher,
            cipher,
        }
    }

    /// Seed an active user with [`PASSWORD`] in `tenant_id`.
    pub fn seed_user(&self, tenant_id: Option<Uuid>, email: &str, role: Role) -> User {
        let mut user = User::new(tenant_id, email.to_string(), role);
        let hash = self.hasher.hash(&Password::new(PASSWORD.to_string())).unwrap();
        user.password_hash = Some(hash.into_string());
        self.store.seed_user(user)
    }

    pub fn seed_member(&self, email: &str, role: Role) -> User {
        self.seed_user(Some(self.tenant.tenant_id), email, role)
    }

    pub fn seed_tenant(&self, slug: &str) -> Tenant {
        self.store
            .seed_tenant(Tenant::new(slug.to_string(), slug.to_uppercase()))
    }

    pub fn access_token(&self, user: &User) -> String {
        self.state.jwt.generate_access_token(user).unwrap().token
    }

    pub fn refresh_token(&self, user: &User) -> String {
        self.state.jwt.generate_refresh_token(user).unwrap().token
    }

    /// Refresh token whose expiry passed a minute ago, correctly signed.
    pub fn expired_refresh_token(&self, user: &User) -> String {
        let mut claims = self.state.jwt.claims_for(user, TokenClass::Refresh);
        claims.iat -= 3600;
        claims.nbf -= 3600;
        claims.exp = chrono::Utc::now().timestamp() - 60;
        self.state.jwt.sign(&claims).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn login_request(email: &str, password: &str) -> Request<Body> {
    json(
        "POST",
        "/auth/login",
        None,
        serde_json::json!({ "email": email, "password": password }),
    )
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The `Set-Cookie` line for `name`, if any.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
}

/// Value part of the `Set-Cookie` line for `name`.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookie(response, name).map(|line| {
        line.split(';')
            .next()
            .unwrap_or_default()
            .trim_start_matches(&format!("{}=", name))
            .to_string()
    })
}
