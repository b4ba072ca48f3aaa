pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::models::Role;
use crate::services::{
    AuthService, CredentialStore, IdentityExchange, JwtService, TenantScopePropagator, UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub propagator: TenantScopePropagator,
    pub exchange: Arc<dyn IdentityExchange>,
    pub login_rate_limiter: IpRateLimiter,
}

/// Tenant routes gated at `required`. The role check runs before a scoped
/// channel is bound, so a refused request never touches storage.
fn tenant_routes(state: &AppState, required: Role, routes: Router<AppState>) -> Router<AppState> {
    routes
        .layer(from_fn_with_state(
            state.clone(),
            middleware::tenant_scope_middleware,
        ))
        .layer(from_fn_with_state(required, middleware::require_role))
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let tenant_api = Router::new()
        .merge(tenant_routes(
            &state,
            Role::Guest,
            Router::new()
                .route("/users/me", get(handlers::user::get_me))
                .route("/tenant/context", get(handlers::tenant::get_context)),
        ))
        .merge(tenant_routes(
            &state,
            Role::Manager,
            Router::new()
                .route("/users/search", get(handlers::user::search_users))
                .route("/users/:user_id", patch(handlers::user::update_user)),
        ))
        .merge(tenant_routes(
            &state,
            Role::TenantAdmin,
            Router::new()
                .route("/users", post(handlers::user::create_user))
                .route(
                    "/users/:user_id",
                    axum::routing::delete(handlers::user::delete_user),
                ),
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let platform_api = Router::new()
        .route(
            "/platform/tenants/:tenant_id",
            get(handlers::platform::get_tenant),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::platform_scope_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(login_route)
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/oauth/start", get(handlers::auth::oauth_start))
        .route("/auth/oauth/callback", get(handlers::auth::oauth_callback))
        .merge(tenant_api)
        .merge(platform_api)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

fn cors_layer(config: &IdentityConfig) -> CorsLayer {
    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter(|o| {
            // Credentialed CORS cannot use a wildcard origin.
            if o.as_str() == "*" {
                tracing::warn!("Ignoring wildcard CORS origin");
            }
            o.as_str() != "*"
        })
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.credentials.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
