use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{handlers::auth::ACCESS_TOKEN_COOKIE, models::IdentityContext, AppState};

/// Bearer credential from the `access_token` cookie, else from an
/// `Authorization: Bearer <token>` header of exactly two parts.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Some(token.to_string())
        }
        _ => None,
    }
}

/// Middleware to require authentication.
///
/// 401 when the credential is missing or invalid, 403 when the account or its
/// tenant is no longer usable, 500 when the status check cannot be made. The
/// tenant record read by the check rides along in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers()).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = state
        .jwt
        .validate_access_token(&token)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let principal = state
        .auth_service
        .verify_principal_status(&claims)
        .await
        .map_err(|e| {
            tracing::info!(user_id = %claims.sub, reason = %e, "Principal refused");
            AppError::from(e)
        })?;

    req.extensions_mut().insert(principal.identity);
    if let Some(tenant) = principal.tenant {
        req.extensions_mut().insert(tenant);
    }

    Ok(next.run(req).await)
}

/// Extractor to easily get the verified identity in handlers
pub struct AuthUser(pub IdentityContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<IdentityContext>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

        Ok(AuthUser(identity.clone()))
    }
}
