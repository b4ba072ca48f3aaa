//! Services layer for the identity service.
//!
//! Credential verification, token issuance, tenant scope propagation and
//! tenant-scoped user administration.

mod auth;
mod database;
pub mod error;
mod jwt;
mod oauth;
mod store;
mod tenant_scope;
mod users;

pub use auth::{AuthOutcome, AuthService, ExternalIdentity, VerifiedPrincipal};
pub use database::{Database, PgScopedChannel};
pub use error::ServiceError;
pub use jwt::{Claims, IssuedToken, JwtService, TokenClass, TokenPair};
pub use oauth::{pkce_challenge, random_token, HttpIdentityExchange, IdentityExchange};
pub use store::{CredentialStore, MemoryStore, TenantStore};
pub use tenant_scope::{
    ensure_tenant_usable, ScopeBinder, ScopeSnapshot, ScopedChannel, TenantScope,
    TenantScopePropagator, SCOPE_BYPASS_RLS, SCOPE_DEPARTMENT_ID, SCOPE_ROLE, SCOPE_TEAM_ID,
    SCOPE_TENANT_ID,
};
pub use users::{ProvisionOutcome, UserService};
