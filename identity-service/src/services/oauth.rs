//! External identity exchange: authorization code in, verified email out.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{ExternalIdentity, ServiceError};
use crate::config::OAuthConfig;

/// Random URL-safe value for the `state` and PKCE verifier.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn pkce_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[async_trait]
pub trait IdentityExchange: Send + Sync {
    /// Provider URL the browser is sent to.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange an authorization code for a verified identity. Unverified
    /// emails are refused here, never downstream.
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ExternalIdentity, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
}

/// OAuth 2.0 authorization-code exchange with PKCE over HTTP.
#[derive(Clone)]
pub struct HttpIdentityExchange {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl HttpIdentityExchange {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityExchange for HttpIdentityExchange {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ExternalIdentity, ServiceError> {
        let token_res = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret().as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to exchange authorization code");
                ServiceError::InvalidCredentials
            })?;

        if !token_res.status().is_success() {
            tracing::warn!(status = %token_res.status(), "Authorization code exchange refused");
            return Err(ServiceError::InvalidCredentials);
        }

        let token: ProviderTokenResponse = token_res.json().await.map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Failed to parse provider token response: {}", e))
        })?;

        let info: ProviderUserInfo = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(token.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch provider user info");
                ServiceError::InvalidCredentials
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::warn!(error = %e, "Provider user info refused");
                ServiceError::InvalidCredentials
            })?
            .json()
            .await
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Failed to parse provider user info: {}", e))
            })?;

        if !info.verified_email {
            return Err(ServiceError::Validation(
                "External account email not verified".to_string(),
            ));
        }

        Ok(ExternalIdentity {
            email: info.email,
            external_id: info.id,
            display_name: info.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client id".to_string(),
            client_secret: Secret::new("shh".to_string()),
            authorize_url: "https://accounts.example.com/auth".to_string(),
            token_url: "https://accounts.example.com/token".to_string(),
            userinfo_url: "https://accounts.example.com/userinfo".to_string(),
            redirect_uri: "http://localhost:8080/auth/oauth/callback".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            default_tenant_id: None,
        }
    }

    #[test]
    fn test_authorize_url_is_encoded() {
        let url = HttpIdentityExchange::new(config()).authorize_url("st ate", "challenge");
        assert!(url.starts_with("https://accounts.example.com/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Foauth%2Fcallback"));
        assert!(url.contains("state=st%20ate"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_pkce_challenge_is_s256() {
        // RFC 7636 appendix B
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_random_tokens_differ() {
        assert_ne!(random_token(), random_token());
    }
}
