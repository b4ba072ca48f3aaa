pub mod external;
pub mod session;

pub use external::{oauth_callback, oauth_start};
pub use session::{login, logout, refresh};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    dtos::auth::TokenResponse,
    services::{AuthOutcome, TokenPair},
    AppState,
};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const CODE_VERIFIER_COOKIE: &str = "code_verifier";

pub const REFRESH_COOKIE_PATH: &str = "/auth/refresh";
pub const OAUTH_COOKIE_PATH: &str = "/auth/oauth";
pub const OAUTH_COOKIE_MINUTES: i64 = 5;

fn cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    same_site: SameSite,
    secure: bool,
    max_age: time::Duration,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(path)
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .max_age(max_age)
        .build()
}

/// Empty cookie with `Max-Age=0` on the same path, so the browser drops it.
fn expired(name: &'static str, path: &'static str, same_site: SameSite, secure: bool) -> Cookie<'static> {
    cookie(name, String::new(), path, same_site, secure, time::Duration::ZERO)
}

pub(crate) fn set_session_cookies(jar: CookieJar, state: &AppState, tokens: &TokenPair) -> CookieJar {
    let secure = state.config.security.cookie_secure;
    jar.add(cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access.token.clone(),
        "/",
        SameSite::Lax,
        secure,
        time::Duration::seconds(state.jwt.access_token_expiry_seconds()),
    ))
    .add(cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh.token.clone(),
        REFRESH_COOKIE_PATH,
        SameSite::Strict,
        secure,
        time::Duration::seconds(state.jwt.refresh_token_expiry_seconds()),
    ))
}

pub(crate) fn clear_refresh_cookie(jar: CookieJar, state: &AppState) -> CookieJar {
    jar.add(expired(
        REFRESH_TOKEN_COOKIE,
        REFRESH_COOKIE_PATH,
        SameSite::Strict,
        state.config.security.cookie_secure,
    ))
}

pub(crate) fn clear_session_cookies(jar: CookieJar, state: &AppState) -> CookieJar {
    let jar = jar.add(expired(
        ACCESS_TOKEN_COOKIE,
        "/",
        SameSite::Lax,
        state.config.security.cookie_secure,
    ));
    clear_refresh_cookie(jar, state)
}

/// Short-lived cookies carrying the OAuth `state` and PKCE verifier across the redirect.
pub(crate) fn set_oauth_cookies(
    jar: CookieJar,
    state: &AppState,
    oauth_state: String,
    code_verifier: String,
) -> CookieJar {
    let secure = state.config.security.cookie_secure;
    let max_age = time::Duration::minutes(OAUTH_COOKIE_MINUTES);
    jar.add(cookie(
        OAUTH_STATE_COOKIE,
        oauth_state,
        OAUTH_COOKIE_PATH,
        SameSite::Lax,
        secure,
        max_age,
    ))
    .add(cookie(
        CODE_VERIFIER_COOKIE,
        code_verifier,
        OAUTH_COOKIE_PATH,
        SameSite::Lax,
        secure,
        max_age,
    ))
}

pub(crate) fn clear_oauth_cookies(jar: CookieJar, state: &AppState) -> CookieJar {
    let secure = state.config.security.cookie_secure;
    jar.add(expired(OAUTH_STATE_COOKIE, OAUTH_COOKIE_PATH, SameSite::Lax, secure))
        .add(expired(CODE_VERIFIER_COOKIE, OAUTH_COOKIE_PATH, SameSite::Lax, secure))
}

pub(crate) fn token_response(outcome: AuthOutcome) -> TokenResponse {
    TokenResponse {
        access_token: outcome.tokens.access.token,
        token_type: "Bearer".to_string(),
        expires_at: outcome.tokens.access.expires_at,
        user: outcome.user.sanitized(),
    }
}
