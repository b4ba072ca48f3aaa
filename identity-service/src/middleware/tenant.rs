//! Tenant scope middleware.
//!
//! Applied after authentication. Runs the tenant gate for the verified identity
//! and hands the handler a [`ScopedSession`] through request extensions. The
//! pooled channel is bound on the session's first use, so work a handler does
//! before touching storage holds no connection. A bound channel commits when
//! the response is a success and rolls back otherwise.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use crate::{
    models::{IdentityContext, Tenant},
    services::{ScopedChannel, ServiceError, TenantScope, TenantScopePropagator},
    AppState,
};

/// Lifecycle of a request's scoped channel.
pub enum ChannelSlot {
    Unbound,
    Bound(Box<dyn ScopedChannel>),
    Released,
}

/// Exclusive access to the bound channel.
pub type ScopedChannelGuard = OwnedMappedMutexGuard<ChannelSlot, dyn ScopedChannel>;

/// Request-scoped handle on the scoped channel.
#[derive(Clone)]
pub struct ScopedSession {
    propagator: TenantScopePropagator,
    scope: Arc<TenantScope>,
    slot: Arc<Mutex<ChannelSlot>>,
}

impl ScopedSession {
    pub fn new(propagator: TenantScopePropagator, scope: TenantScope) -> Self {
        Self {
            propagator,
            scope: Arc::new(scope),
            slot: Arc::new(Mutex::new(ChannelSlot::Unbound)),
        }
    }

    /// The scoped channel, bound on first call. Held until the guard drops.
    pub async fn channel(&self) -> Result<ScopedChannelGuard, AppError> {
        let mut slot = self.slot.clone().lock_owned().await;
        if matches!(*slot, ChannelSlot::Unbound) {
            let channel = self.propagator.bind(&self.scope).await?;
            *slot = ChannelSlot::Bound(channel);
        }

        OwnedMutexGuard::try_map(slot, |slot| match slot {
            ChannelSlot::Bound(channel) => Some(&mut **channel),
            _ => None,
        })
        .map_err(|_| AppError::InternalError(anyhow::anyhow!("Scoped channel already released")))
    }

    /// Commit or roll back a bound channel, releasing the connection. An
    /// unbound session has nothing to release. Later calls are no-ops.
    pub async fn finish(&self, commit: bool) -> Result<(), ServiceError> {
        let previous = std::mem::replace(&mut *self.slot.lock().await, ChannelSlot::Released);
        match previous {
            ChannelSlot::Bound(channel) if commit => channel.commit().await,
            ChannelSlot::Bound(channel) => channel.rollback().await,
            ChannelSlot::Unbound | ChannelSlot::Released => Ok(()),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ScopedSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ScopedSession>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Scoped session missing from request extensions"
            ))
        })
    }
}

fn identity_of(req: &Request) -> Result<IdentityContext, AppError> {
    req.extensions()
        .get::<IdentityContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))
}

async fn run_scoped(session: ScopedSession, mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    let commit = response.status().is_success();
    match session.finish(commit).await {
        Ok(()) => response,
        Err(e) => {
            tracing::error!(error = %e, commit, "Failed to release scoped channel");
            AppError::from(e).into_response()
        }
    }
}

/// Establish the tenant scope for tenant routes. Fails closed: no scope, no handler.
pub async fn tenant_scope_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identity_of(&req)?;
    let verified = req.extensions().get::<Tenant>().cloned();
    let scope = state
        .propagator
        .establish(&identity, verified.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(
                user_id = %identity.user_id,
                tenant_id = ?identity.tenant_id,
                reason = %e,
                "Tenant scope refused"
            );
            AppError::from(e)
        })?;

    Ok(run_scoped(ScopedSession::new(state.propagator.clone(), scope), req, next).await)
}

/// Establish the platform bypass scope. Mounted on the platform router only.
pub async fn platform_scope_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identity_of(&req)?;
    let scope = state.propagator.bypass(&identity)?;

    Ok(run_scoped(ScopedSession::new(state.propagator.clone(), scope), req, next).await)
}
