pub mod auth;
pub mod role;
pub mod tenant;

pub use auth::{auth_middleware, extract_bearer_token, AuthUser};
pub use role::require_role;
pub use tenant::{platform_scope_middleware, tenant_scope_middleware, ScopedSession};
