use axum::Json;
use service_core::error::AppError;

use crate::{middleware::ScopedSession, services::ScopeSnapshot};

/// Scope variables as the storage channel sees them.
pub async fn get_context(session: ScopedSession) -> Result<Json<ScopeSnapshot>, AppError> {
    let mut channel = session.channel().await?;
    let snapshot = channel.read_back().await?;
    Ok(Json(snapshot))
}
