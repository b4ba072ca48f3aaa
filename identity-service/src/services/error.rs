use service_core::error::AppError;
use thiserror::Error;

use crate::utils::CipherError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Field cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account has been deleted")]
    AccountDeleted,

    #[error("Organization not found")]
    TenantNotFound,

    #[error("Organization deleted")]
    TenantDeleted,

    #[error("Organization is {0}")]
    TenantUnavailable(String),

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Tenant mismatch")]
    TenantMismatch,

    #[error("Account is not registered")]
    NotRegistered,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    pub fn database(err: impl Into<anyhow::Error>) -> Self {
        ServiceError::Database(err.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Cipher(e) => AppError::InternalError(anyhow::Error::new(e)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            e @ (ServiceError::AccountInactive
            | ServiceError::AccountDeleted
            | ServiceError::TenantNotFound
            | ServiceError::TenantDeleted
            | ServiceError::TenantUnavailable(_)
            | ServiceError::InsufficientRole
            | ServiceError::TenantMismatch
            | ServiceError::NotRegistered) => AppError::Forbidden(anyhow::anyhow!(e.to_string())),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_authentication_failures_are_401() {
        assert_eq!(status_of(ServiceError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ServiceError::InvalidToken), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_authorization_failures_are_403() {
        for err in [
            ServiceError::AccountInactive,
            ServiceError::AccountDeleted,
            ServiceError::TenantNotFound,
            ServiceError::TenantDeleted,
            ServiceError::TenantUnavailable("suspended".to_string()),
            ServiceError::InsufficientRole,
            ServiceError::TenantMismatch,
            ServiceError::NotRegistered,
        ] {
            assert_eq!(status_of(err), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_dependency_failures_are_500() {
        assert_eq!(
            status_of(ServiceError::database(anyhow::anyhow!("connection reset"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ServiceError::Cipher(CipherError::DecryptionFailed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_suspended_tenant_message_names_status() {
        assert_eq!(
            ServiceError::TenantUnavailable("suspended".to_string()).to_string(),
            "Organization is suspended"
        );
    }
}
