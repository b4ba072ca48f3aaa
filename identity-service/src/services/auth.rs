use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{normalize_email, IdentityContext, Role, Tenant, User},
    services::{
        ensure_tenant_usable, Claims, CredentialStore, JwtService, ServiceError, TenantStore,
        TokenPair,
    },
    utils::{CredentialHasher, Password, PasswordHashString},
};

/// Result of a successful login, refresh or external sign-in.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub tokens: TokenPair,
    pub user: User,
}

/// Verified identity returned by an [`IdentityExchange`](super::IdentityExchange).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub email: String,
    pub external_id: String,
    pub display_name: Option<String>,
}

/// Principal that passed the live status check, with the tenant record read
/// during the check.
#[derive(Debug, Clone)]
pub struct VerifiedPrincipal {
    pub identity: IdentityContext,
    pub tenant: Option<Tenant>,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    tenants: Arc<dyn TenantStore>,
    jwt: JwtService,
    hasher: CredentialHasher,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tenants: Arc<dyn TenantStore>,
        jwt: JwtService,
        hasher: CredentialHasher,
    ) -> Self {
        Self {
            credentials,
            tenants,
            jwt,
            hasher,
        }
    }

    pub async fn login(&self, email: &str, password: Password) -> Result<AuthOutcome, ServiceError> {
        let user = self
            .credentials
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            tracing::warn!(user_id = %user.user_id, "Login attempt on inactive account");
            return Err(ServiceError::AccountInactive);
        }

        let stored_hash = user
            .password_hash
            .clone()
            .ok_or(ServiceError::InvalidCredentials)?;

        let valid = self
            .hasher
            .verify_blocking(password, PasswordHashString::new(stored_hash))
            .await
            .map_err(ServiceError::Internal)?;
        if !valid {
            tracing::info!(user_id = %user.user_id, "Login rejected: password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }

        if let Some(tenant_id) = user.tenant_id {
            ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?;
        }

        let outcome = self.issue(user)?;
        self.record_login(&outcome.user).await;

        tracing::info!(
            user_id = %outcome.user.user_id,
            tenant_id = ?outcome.user.tenant_id,
            role = %outcome.user.role,
            "User logged in"
        );
        Ok(outcome)
    }

    /// Rotate a refresh token into a fresh pair, re-reading the principal.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthOutcome, ServiceError> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;

        let user = self
            .credentials
            .find_user_by_id(claims.user_id()?)
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(ServiceError::InvalidToken)?;

        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }
        if let Some(tenant_id) = user.tenant_id {
            ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?;
        }

        let outcome = self.issue(user)?;
        tracing::info!(user_id = %outcome.user.user_id, "Token refreshed for user");
        Ok(outcome)
    }

    /// Re-check live account status for a validated access token.
    ///
    /// The returned identity carries the stored role and org placement, so a
    /// demotion applies on the next request rather than at token expiry.
    pub async fn verify_principal_status(
        &self,
        claims: &Claims,
    ) -> Result<VerifiedPrincipal, ServiceError> {
        let user = self
            .credentials
            .find_user_by_id(claims.user_id()?)
            .await?
            .ok_or(ServiceError::AccountDeleted)?;

        if user.is_deleted() {
            return Err(ServiceError::AccountDeleted);
        }
        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }
        if user.tenant_id != claims.tenant_id {
            tracing::warn!(user_id = %user.user_id, "Token tenant does not match stored tenant");
            return Err(ServiceError::TenantMismatch);
        }
        let tenant = match user.tenant_id {
            Some(tenant_id) => Some(ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?),
            None => None,
        };

        Ok(VerifiedPrincipal {
            identity: IdentityContext::from(&user),
            tenant,
        })
    }

    /// Sign in through a verified external identity: link it to the existing
    /// record with that email, or provision an employee in `default_tenant_id`.
    pub async fn authenticate_external(
        &self,
        identity: ExternalIdentity,
        default_tenant_id: Option<Uuid>,
    ) -> Result<AuthOutcome, ServiceError> {
        let email = normalize_email(&identity.email);

        let user = match self.credentials.find_any_user_by_email(&email).await? {
            Some(existing) if existing.is_deleted() => {
                tracing::warn!(user_id = %existing.user_id, "External sign-in for deleted account");
                return Err(ServiceError::AccountDeleted);
            }
            Some(existing) => {
                if !existing.is_active {
                    return Err(ServiceError::AccountInactive);
                }
                if let Some(tenant_id) = existing.tenant_id {
                    ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?;
                }

                if existing.external_id.as_deref() != Some(identity.external_id.as_str())
                    || existing.password_hash.is_some()
                {
                    self.credentials
                        .link_external_identity(existing.user_id, &identity.external_id)
                        .await?;
                    tracing::info!(user_id = %existing.user_id, "Linked external identity");
                }

                let mut linked = existing;
                linked.external_id = Some(identity.external_id);
                linked.password_hash = None;
                linked
            }
            None => {
                let tenant_id = default_tenant_id.ok_or(ServiceError::NotRegistered)?;
                ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?;

                let mut user = User::new(Some(tenant_id), email, Role::Employee);
                user.external_id = Some(identity.external_id);
                user.display_name = identity.display_name;
                self.credentials.insert_user(&user).await?;

                tracing::info!(
                    user_id = %user.user_id,
                    tenant_id = %tenant_id,
                    "Provisioned user from external identity"
                );
                user
            }
        };

        let outcome = self.issue(user)?;
        self.record_login(&outcome.user).await;
        Ok(outcome)
    }

    fn issue(&self, user: User) -> Result<AuthOutcome, ServiceError> {
        let tokens = self.jwt.generate_token_pair(&user)?;
        Ok(AuthOutcome { tokens, user })
    }

    async fn record_login(&self, user: &User) {
        if let Err(e) = self.credentials.record_login(user.user_id).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "Failed to record last login");
        }
    }
}
