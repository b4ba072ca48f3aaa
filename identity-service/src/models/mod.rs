pub mod identity;
pub mod role;
pub mod tenant;
pub mod user;

pub use identity::IdentityContext;
pub use role::{assignable_roles, role_level, satisfies, Role};
pub use tenant::{Tenant, TenantResponse, TenantState};
pub use user::{normalize_email, normalize_phone, UpdateUserRequest, User, UserResponse};
