use axum::{extract::Path, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{middleware::ScopedSession, models::TenantResponse};

/// Any tenant by ID, including suspended and soft-deleted ones.
pub async fn get_tenant(
    session: ScopedSession,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantResponse>, AppError> {
    let mut channel = session.channel().await?;
    let tenant = channel
        .find_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    Ok(Json(TenantResponse::from(tenant)))
}
