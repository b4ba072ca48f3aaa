use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::{
    clear_refresh_cookie, clear_session_cookies, set_session_cookies, token_response,
    REFRESH_TOKEN_COOKIE,
};
use crate::{
    dtos::auth::{LoginRequest, TokenResponse},
    services::ServiceError,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with email and password.
///
/// The access token is returned in the body and in its cookie. The refresh
/// token is only ever sent as a cookie scoped to the refresh path.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), AppError> {
    let outcome = state
        .auth_service
        .login(&req.email, Password::new(req.password))
        .await?;

    let jar = set_session_cookies(jar, &state, &outcome.tokens);
    Ok((jar, Json(token_response(outcome))))
}

/// Exchange the refresh cookie for a new token pair. Every failure clears the
/// refresh cookie.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<TokenResponse>), (CookieJar, AppError)> {
    let token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty());

    let result = match token {
        Some(token) => state.auth_service.refresh(&token).await,
        None => Err(ServiceError::InvalidToken),
    };

    match result {
        Ok(outcome) => {
            let jar = set_session_cookies(jar, &state, &outcome.tokens);
            Ok((jar, Json(token_response(outcome))))
        }
        Err(e) => {
            tracing::info!(reason = %e, "Refresh refused");
            Err((clear_refresh_cookie(jar, &state), AppError::from(e)))
        }
    }
}

/// Clear both session cookies. Issued tokens stay valid until they expire.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    (
        clear_session_cookies(jar, &state),
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    )
}
