use axum::{
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use super::{
    clear_oauth_cookies, set_oauth_cookies, set_session_cookies, CODE_VERIFIER_COOKIE,
    OAUTH_STATE_COOKIE,
};
use crate::{
    dtos::auth::OAuthCallbackQuery,
    services::{pkce_challenge, random_token},
    AppState,
};

/// Start the authorization-code flow: remember `state` and the PKCE verifier in
/// short-lived cookies and send the browser to the provider.
pub async fn oauth_start(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let oauth_state = random_token();
    let code_verifier = random_token();
    let url = state
        .exchange
        .authorize_url(&oauth_state, &pkce_challenge(&code_verifier));

    let jar = set_oauth_cookies(jar, &state, oauth_state, code_verifier);
    (jar, Redirect::to(&url))
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let state_matches = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|c| bool::from(c.value().as_bytes().ct_eq(query.state.as_bytes())))
        .unwrap_or(false);
    if !state_matches {
        tracing::warn!("OAuth callback with mismatched state");
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
    }

    let code_verifier = jar
        .get(CODE_VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing code verifier")))?;

    let identity = state.exchange.exchange(&query.code, &code_verifier).await?;
    let outcome = state
        .auth_service
        .authenticate_external(identity, state.config.oauth.default_tenant_id)
        .await?;

    tracing::info!(
        user_id = %outcome.user.user_id,
        tenant_id = ?outcome.user.tenant_id,
        "User logged in through external identity"
    );

    let jar = clear_oauth_cookies(jar, &state);
    let jar = set_session_cookies(jar, &state, &outcome.tokens);
    Ok((jar, Redirect::to(&state.config.oauth.frontend_url)))
}
