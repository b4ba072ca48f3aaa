//! Credential record - a principal's stored authentication material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::Role;

/// User entity. Never serialized directly: it carries the password hash.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    /// `None` for platform-level principals.
    pub tenant_id: Option<Uuid>,
    pub email: String,
    /// `None` when the principal only signs in through an external identity.
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub is_active: bool,
    pub phone_encrypted: Option<String>,
    pub phone_index: Option<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new active user.
    pub fn new(tenant_id: Option<Uuid>, email: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            tenant_id,
            email: normalize_email(&email),
            password_hash: None,
            external_id: None,
            display_name: None,
            role: role.as_str().to_string(),
            department_id: None,
            team_id: None,
            is_active: true,
            phone_encrypted: None,
            phone_index: None,
            last_login_utc: None,
            deleted_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }

    /// Convert to sanitized response (no credential material, no PII ciphertext).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// Emails are unique system-wide, compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonical phone form shared by storage and search: whitespace and the
/// usual separators removed, digits and a leading `+` kept.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')' | '/'))
        .collect()
}

/// Explicit set of fields an administrator may change on a credential record.
///
/// Unknown fields are rejected at deserialization so that credential columns
/// can never be written through this path.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Display name must be 1-200 characters"))]
    pub display_name: Option<String>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.is_active.is_none()
            && self.department_id.is_none()
            && self.team_id.is_none()
            && self.display_name.is_none()
    }

    /// Apply to an in-memory record.
    pub fn apply(&self, user: &mut User) {
        if let Some(role) = self.role {
            user.role = role.as_str().to_string();
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(department_id) = self.department_id {
            user.department_id = Some(department_id);
        }
        if let Some(team_id) = self.team_id {
            user.team_id = Some(team_id);
        }
        if let Some(display_name) = &self.display_name {
            user.display_name = Some(display_name.clone());
        }
        user.updated_utc = Utc::now();
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub is_active: bool,
    pub external_identity_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl UserResponse {
    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone.filter(|p| !p.is_empty());
        self
    }
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            external_identity_linked: u.external_id.is_some(),
            user_id: u.user_id,
            tenant_id: u.tenant_id,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            department_id: u.department_id,
            team_id: u.team_id,
            is_active: u.is_active,
            phone: None,
            last_login_utc: u.last_login_utc,
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new(None, "  A@X.com ".to_string(), Role::Employee);
        assert_eq!(user.email, "a@x.com");
        assert!(user.is_active);
        assert!(!user.is_deleted());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" 0812345678 "), "0812345678");
        assert_eq!(normalize_phone("+62 (812) 345-678"), "+62812345678");
        assert_eq!(normalize_phone("081.234.5678"), "0812345678");
        assert_eq!(normalize_phone("   "), "");
    }

    #[test]
    fn test_sanitized_has_no_credential_fields() {
        let mut user = User::new(Some(Uuid::new_v4()), "a@x.com".to_string(), Role::Manager);
        user.password_hash = Some("$argon2id$secret".to_string());
        user.phone_encrypted = Some("ciphertext".to_string());

        let json = serde_json::to_value(user.sanitized()).unwrap();
        let text = json.to_string();
        assert!(json.get("password_hash").is_none());
        assert!(!text.contains("argon2id"));
        assert!(!text.contains("ciphertext"));
    }

    #[test]
    fn test_update_rejects_credential_columns() {
        let attempt = r#"{"password_hash": "x"}"#;
        assert!(serde_json::from_str::<UpdateUserRequest>(attempt).is_err());

        let attempt = r#"{"tenant_id": "7d0c4a5e-8d0a-4f43-9d3b-1f4c2e6f1a10"}"#;
        assert!(serde_json::from_str::<UpdateUserRequest>(attempt).is_err());
    }

    #[test]
    fn test_update_apply() {
        let mut user = User::new(None, "a@x.com".to_string(), Role::Employee);
        let update: UpdateUserRequest =
            serde_json::from_str(r#"{"role": "manager", "is_active": false}"#).unwrap();
        assert!(!update.is_empty());

        update.apply(&mut user);
        assert_eq!(user.role, "manager");
        assert!(!user.is_active);
    }
}
