use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::{IdentityContext, Role};

/// Route gate: the verified identity must satisfy `required`.
///
/// Mount with `from_fn_with_state(Role::Manager, require_role)` inside the
/// authentication layer.
pub async fn require_role(
    State(required): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req
        .extensions()
        .get::<IdentityContext>()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    if !identity.satisfies(required) {
        tracing::info!(
            user_id = %identity.user_id,
            role = %identity.role,
            required = %required,
            "Role requirement not met"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Requires role {} or higher",
            required
        )));
    }

    Ok(next.run(req).await)
}
