use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, UserResponse};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Omitted for principals that will only sign in through an external identity.
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Display name must be 1-200 characters"))]
    pub display_name: Option<String>,

    pub role: Role,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,

    #[validate(length(min = 6, max = 32, message = "Phone must be 6-32 characters"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PhoneSearchQuery {
    #[validate(length(min = 6, max = 32, message = "Phone must be 6-32 characters"))]
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}
