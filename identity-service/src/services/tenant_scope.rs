//! Tenant context propagation.
//!
//! A verified identity becomes a [`TenantScope`], which is bound onto a storage
//! channel before any other statement runs on it. Row-level predicates read the
//! bound values; the binding lives only as long as the channel's transaction.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::store::TenantStore;
use super::ServiceError;
use crate::models::{IdentityContext, Role, Tenant, UpdateUserRequest, User};

/// Session variable names read by the row-level policies.
pub const SCOPE_TENANT_ID: &str = "app.tenant_id";
pub const SCOPE_ROLE: &str = "app.role";
pub const SCOPE_DEPARTMENT_ID: &str = "app.department_id";
pub const SCOPE_TEAM_ID: &str = "app.team_id";
pub const SCOPE_BYPASS_RLS: &str = "app.bypass_rls";

/// Per-request scoping state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantScope {
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub bypass: bool,
}

impl TenantScope {
    fn for_identity(identity: &IdentityContext) -> Self {
        Self {
            tenant_id: identity.tenant_id,
            role: identity.role.clone(),
            department_id: identity.department_id,
            team_id: identity.team_id,
            bypass: false,
        }
    }

    /// Values in the order they are bound: tenant, role, department, team, bypass.
    /// Absent values bind as the empty string.
    pub fn settings(&self) -> [(&'static str, String); 5] {
        let text = |id: Option<Uuid>| id.map(|v| v.to_string()).unwrap_or_default();
        [
            (SCOPE_TENANT_ID, text(self.tenant_id)),
            (SCOPE_ROLE, self.role.clone()),
            (SCOPE_DEPARTMENT_ID, text(self.department_id)),
            (SCOPE_TEAM_ID, text(self.team_id)),
            (SCOPE_BYPASS_RLS, if self.bypass { "on" } else { "off" }.to_string()),
        ]
    }
}

/// The scoping values as the storage layer currently sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeSnapshot {
    pub tenant_id: Option<String>,
    pub role: Option<String>,
    pub department_id: Option<String>,
    pub team_id: Option<String>,
    pub bypass_rls: bool,
}

impl ScopeSnapshot {
    pub fn from_settings(
        tenant_id: Option<String>,
        role: Option<String>,
        department_id: Option<String>,
        team_id: Option<String>,
        bypass_rls: Option<String>,
    ) -> Self {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            tenant_id: present(tenant_id),
            role: present(role),
            department_id: present(department_id),
            team_id: present(team_id),
            bypass_rls: bypass_rls.as_deref() == Some("on"),
        }
    }
}

/// A storage channel with a scope bound for the lifetime of one transaction.
///
/// Every data operation a tenant-scoped handler performs goes through here so
/// the row-level predicates apply. Dropping the channel without `commit` rolls
/// back and discards the scope.
#[async_trait]
pub trait ScopedChannel: Send {
    fn scope(&self) -> &TenantScope;

    async fn read_back(&mut self) -> Result<ScopeSnapshot, ServiceError>;

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Visible record by email, soft-deleted included.
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn find_users_by_phone_index(&mut self, index: &str) -> Result<Vec<User>, ServiceError>;

    /// Fresh insert. A duplicate email, live or soft-deleted, is a conflict.
    async fn insert_user(&mut self, user: &User) -> Result<(), ServiceError>;

    /// Explicit transition of a soft-deleted record back to live, overwriting its
    /// provisioning fields.
    async fn revive_user(&mut self, user: &User) -> Result<bool, ServiceError>;

    async fn update_user(
        &mut self,
        user_id: Uuid,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, ServiceError>;

    async fn soft_delete_user(&mut self, user_id: Uuid) -> Result<bool, ServiceError>;

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}

/// Opens a transaction and binds a scope onto it in a single statement.
#[async_trait]
pub trait ScopeBinder: Send + Sync {
    async fn bind(&self, scope: &TenantScope) -> Result<Box<dyn ScopedChannel>, ServiceError>;
}

/// Tenant lifecycle check on a record already in hand.
pub fn check_tenant_usable(tenant: &Tenant) -> Result<(), ServiceError> {
    if tenant.is_deleted() {
        return Err(ServiceError::TenantDeleted);
    }
    if !tenant.is_active() {
        return Err(ServiceError::TenantUnavailable(tenant.tenant_state_code.clone()));
    }
    Ok(())
}

/// Tenant lifecycle gate: missing, soft-deleted and non-active tenants are refused.
pub async fn ensure_tenant_usable(
    tenants: &dyn TenantStore,
    tenant_id: Uuid,
) -> Result<Tenant, ServiceError> {
    let tenant = tenants
        .find_tenant_by_id(tenant_id)
        .await?
        .ok_or(ServiceError::TenantNotFound)?;

    check_tenant_usable(&tenant)?;
    Ok(tenant)
}

#[derive(Clone)]
pub struct TenantScopePropagator {
    tenants: Arc<dyn TenantStore>,
    binder: Arc<dyn ScopeBinder>,
}

impl TenantScopePropagator {
    pub fn new(tenants: Arc<dyn TenantStore>, binder: Arc<dyn ScopeBinder>) -> Self {
        Self { tenants, binder }
    }

    /// Gate on tenant lifecycle and derive the identity's scope. Nothing is bound.
    ///
    /// `verified` is the tenant record already read for this request. It is
    /// re-checked in memory instead of looked up again; any other tenant id
    /// falls back to a store lookup. Platform principals get a "no tenant"
    /// scope without the bypass flag.
    pub async fn establish(
        &self,
        identity: &IdentityContext,
        verified: Option<&Tenant>,
    ) -> Result<TenantScope, ServiceError> {
        if let Some(tenant_id) = identity.tenant_id {
            match verified {
                Some(tenant) if tenant.tenant_id == tenant_id => check_tenant_usable(tenant)?,
                _ => {
                    ensure_tenant_usable(self.tenants.as_ref(), tenant_id).await?;
                }
            }
        }

        tracing::debug!(
            user_id = %identity.user_id,
            tenant_id = ?identity.tenant_id,
            role = %identity.role,
            "Tenant scope established"
        );
        Ok(TenantScope::for_identity(identity))
    }

    /// Platform-wide scope with row-level filtering bypassed. Only a super admin
    /// that belongs to no tenant may obtain it.
    pub fn bypass(&self, identity: &IdentityContext) -> Result<TenantScope, ServiceError> {
        if !identity.is_platform_admin() {
            tracing::warn!(
                user_id = %identity.user_id,
                role = %identity.role,
                "Refused platform bypass scope"
            );
            return Err(ServiceError::InsufficientRole);
        }

        tracing::info!(user_id = %identity.user_id, "Platform bypass scope established");
        Ok(TenantScope {
            tenant_id: None,
            role: Role::SuperAdmin.as_str().to_string(),
            department_id: None,
            team_id: None,
            bypass: true,
        })
    }

    /// Take a pooled channel and bind `scope` onto it.
    pub async fn bind(&self, scope: &TenantScope) -> Result<Box<dyn ScopedChannel>, ServiceError> {
        self.binder.bind(scope).await
    }
}
