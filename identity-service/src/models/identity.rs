use serde::Serialize;
use uuid::Uuid;

use super::{satisfies, Role, User};

/// Verified identity attached to a request after token validation and the
/// live account status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub user_id: Uuid,
    /// `None` for platform principals.
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}

impl IdentityContext {
    pub fn satisfies(&self, required: Role) -> bool {
        satisfies(&self.role, required)
    }

    pub fn is_platform_admin(&self) -> bool {
        self.tenant_id.is_none() && self.role == Role::SuperAdmin.as_str()
    }
}

impl From<&User> for IdentityContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            role: user.role.clone(),
            department_id: user.department_id,
            team_id: user.team_id,
        }
    }
}
