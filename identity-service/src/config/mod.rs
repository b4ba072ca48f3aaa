use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use uuid::Uuid;

/// Process-wide configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub oauth: OAuthConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub signing_secret: Secret<String>,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub pepper: Secret<String>,
    pub field_encryption_key: Secret<String>,
    pub allowed_origins: Vec<String>,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_uri: String,
    pub frontend_url: String,
    /// Tenant that receives first-time external sign-ins. `None` disables provisioning.
    pub default_tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

const MIN_PROD_SECRET_LEN: usize = 32;

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                signing_secret: Secret::new(get_env("JWT_SIGNING_SECRET", None, is_prod)?),
                issuer: get_env("JWT_ISSUER", Some("identity-service"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_minutes: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_MINUTES",
                    "10080",
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                pepper: Secret::new(get_env("PASSWORD_PEPPER", None, is_prod)?),
                field_encryption_key: Secret::new(get_env("FIELD_ENCRYPTION_KEY", None, is_prod)?),
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                cookie_secure: parse_env("COOKIE_SECURE", "true", is_prod)?,
            },
            oauth: OAuthConfig {
                client_id: get_env("OAUTH_CLIENT_ID", Some(""), is_prod)?,
                client_secret: Secret::new(get_env("OAUTH_CLIENT_SECRET", Some(""), is_prod)?),
                authorize_url: get_env(
                    "OAUTH_AUTHORIZE_URL",
                    Some("https://accounts.google.com/o/oauth2/v2/auth"),
                    is_prod,
                )?,
                token_url: get_env(
                    "OAUTH_TOKEN_URL",
                    Some("https://oauth2.googleapis.com/token"),
                    is_prod,
                )?,
                userinfo_url: get_env(
                    "OAUTH_USERINFO_URL",
                    Some("https://www.googleapis.com/oauth2/v2/userinfo"),
                    is_prod,
                )?,
                redirect_uri: get_env(
                    "OAUTH_REDIRECT_URI",
                    Some("http://localhost:8080/auth/oauth/callback"),
                    is_prod,
                )?,
                frontend_url: get_env("OAUTH_FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
                default_tenant_id: match env::var("OAUTH_DEFAULT_TENANT_ID") {
                    Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse().map_err(
                        |e: uuid::Error| {
                            AppError::ConfigError(anyhow::anyhow!(
                                "OAUTH_DEFAULT_TENANT_ID is not a UUID: {}",
                                e
                            ))
                        },
                    )?),
                    _ => None,
                },
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_minutes <= self.jwt.access_token_expiry_minutes {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_MINUTES must exceed the access token lifetime"
            )));
        }

        for (key, secret) in [
            ("JWT_SIGNING_SECRET", &self.jwt.signing_secret),
            ("PASSWORD_PEPPER", &self.security.pepper),
            ("FIELD_ENCRYPTION_KEY", &self.security.field_encryption_key),
        ] {
            let len = secret.expose_secret().len();
            if len == 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!("{} must not be empty", key)));
            }
            if self.environment == Environment::Prod && len < MIN_PROD_SECRET_LEN {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be at least {} bytes in production",
                    key,
                    MIN_PROD_SECRET_LEN
                )));
            }
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.security.cookie_secure {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "COOKIE_SECURE must be true in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
