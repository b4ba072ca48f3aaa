use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceError;
use crate::config::JwtConfig;
use crate::models::{IdentityContext, User};

/// Token classes differ only in lifetime and issuer label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    fn label(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        }
    }
}

/// Identity claims carried by both token classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Uuid>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, ServiceError> {
        Uuid::parse_str(&self.sub).map_err(|_| ServiceError::InvalidToken)
    }

    pub fn identity(&self) -> Result<IdentityContext, ServiceError> {
        Ok(IdentityContext {
            user_id: self.user_id()?,
            tenant_id: self.tenant_id,
            email: self.email.clone(),
            role: self.role.clone(),
            department_id: self.department_id,
            team_id: self.team_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// HS256 token issuance and validation.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let secret = config.signing_secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(anyhow::anyhow!("JWT signing secret must not be empty"));
        }

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_minutes: config.refresh_token_expiry_minutes,
        })
    }

    fn issuer_for(&self, class: TokenClass) -> String {
        format!("{}/{}", self.issuer, class.label())
    }

    fn lifetime(&self, class: TokenClass) -> Duration {
        match class {
            TokenClass::Access => Duration::minutes(self.access_token_expiry_minutes),
            TokenClass::Refresh => Duration::minutes(self.refresh_token_expiry_minutes),
        }
    }

    /// Build the claims for a principal without signing them.
    pub fn claims_for(&self, user: &User, class: TokenClass) -> Claims {
        let now = Utc::now();
        let exp = now + self.lifetime(class);

        Claims {
            sub: user.user_id.to_string(),
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            role: user.role.clone(),
            department_id: user.department_id,
            team_id: user.team_id,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer_for(class),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    fn issue(&self, user: &User, class: TokenClass) -> Result<IssuedToken, anyhow::Error> {
        let claims = self.claims_for(user, class);
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| anyhow::anyhow!("Token expiry out of range"))?;

        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    pub fn generate_access_token(&self, user: &User) -> Result<IssuedToken, anyhow::Error> {
        self.issue(user, TokenClass::Access)
    }

    pub fn generate_refresh_token(&self, user: &User) -> Result<IssuedToken, anyhow::Error> {
        self.issue(user, TokenClass::Refresh)
    }

    pub fn generate_token_pair(&self, user: &User) -> Result<TokenPair, anyhow::Error> {
        Ok(TokenPair {
            access: self.generate_access_token(user)?,
            refresh: self.generate_refresh_token(user)?,
        })
    }

    /// Validate signature, algorithm, issuer and time bounds.
    ///
    /// Every failure collapses to [`ServiceError::InvalidToken`].
    pub fn validate(&self, token: &str, class: TokenClass) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer_for(class)]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, class = class.label(), "Token rejected");
                ServiceError::InvalidToken
            })?
            .claims;

        // The library compares with `<`; a token is dead at its expiry second.
        let now = Utc::now().timestamp();
        if claims.exp <= now || claims.nbf > now {
            return Err(ServiceError::InvalidToken);
        }

        Ok(claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, ServiceError> {
        self.validate(token, TokenClass::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, ServiceError> {
        self.validate(token, TokenClass::Refresh)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_token_expiry_minutes * 60
    }
}
