//! Storage seams for credentials and tenants, plus an in-process implementation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::tenant_scope::{ScopeBinder, ScopeSnapshot, ScopedChannel, TenantScope};
use super::ServiceError;
use crate::models::{Tenant, UpdateUserRequest, User};

/// Credential lookups that run before any tenant scope exists (login, refresh,
/// per-request status checks, external identity linking).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Live record by email. Soft-deleted records count as absent.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    /// Any record by email, soft-deleted included.
    async fn find_any_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    /// Any record by ID, soft-deleted included.
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    /// Attach an external identity and clear the password hash.
    async fn link_external_identity(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> Result<(), ServiceError>;

    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tenants: HashMap<Uuid, Tenant>,
    bound_scopes: Vec<TenantScope>,
    releases: Vec<bool>,
    channel_queries: usize,
    tenant_lookups: usize,
    failing: bool,
}

impl MemoryState {
    fn check_available(&self) -> Result<(), ServiceError> {
        if self.failing {
            return Err(ServiceError::database(anyhow::anyhow!("memory store unavailable")));
        }
        Ok(())
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.user_id) != except)
    }
}

/// In-process store. Scoped channels stage their writes and apply them on commit,
/// and filter rows by the bound tenant the way the row-level policy does.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, ServiceError> {
        let state = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store mutex poisoned: {}", e))?;
        state.check_available()?;
        Ok(state)
    }

    fn raw(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_tenant(&self, tenant: Tenant) -> Tenant {
        self.raw().tenants.insert(tenant.tenant_id, tenant.clone());
        tenant
    }

    pub fn seed_user(&self, user: User) -> User {
        self.raw().users.insert(user.user_id, user.clone());
        user
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.raw().users.get(&user_id).cloned()
    }

    pub fn set_tenant_state(&self, tenant_id: Uuid, state_code: &str) {
        if let Some(tenant) = self.raw().tenants.get_mut(&tenant_id) {
            tenant.tenant_state_code = state_code.to_string();
        }
    }

    pub fn set_user_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(user) = self.raw().users.get_mut(&user_id) {
            user.is_active = is_active;
        }
    }

    /// Make every subsequent store call fail as a dependency error.
    pub fn set_failing(&self, failing: bool) {
        self.raw().failing = failing;
    }

    /// Scopes bound so far, in order.
    pub fn bound_scopes(&self) -> Vec<TenantScope> {
        self.raw().bound_scopes.clone()
    }

    /// How each released channel ended: `true` for commit, `false` for rollback.
    pub fn releases(&self) -> Vec<bool> {
        self.raw().releases.clone()
    }

    pub fn channel_queries(&self) -> usize {
        self.raw().channel_queries
    }

    /// Tenant status lookups made outside any scoped channel.
    pub fn tenant_lookups(&self) -> usize {
        self.raw().tenant_lookups
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email && !u.is_deleted())
            .cloned())
    }

    async fn find_any_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.state()?.users.get(&user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.email_taken(&user.email, None) {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn link_external_identity(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(ServiceError::UserNotFound)?;
        user.external_id = Some(external_id.to_string());
        user.password_hash = None;
        user.updated_utc = Utc::now();
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if let Some(user) = self.state()?.users.get_mut(&user_id) {
            user.last_login_utc = Some(Utc::now());
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.state().map(|_| ())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let mut state = self.state()?;
        state.tenant_lookups += 1;
        Ok(state.tenants.get(&tenant_id).cloned())
    }
}

#[async_trait]
impl ScopeBinder for MemoryStore {
    async fn bind(&self, scope: &TenantScope) -> Result<Box<dyn ScopedChannel>, ServiceError> {
        self.state()?.bound_scopes.push(scope.clone());
        Ok(Box::new(MemoryChannel {
            store: self.clone(),
            scope: scope.clone(),
            staged: HashMap::new(),
        }))
    }
}

struct MemoryChannel {
    store: MemoryStore,
    scope: TenantScope,
    staged: HashMap<Uuid, User>,
}

impl MemoryChannel {
    fn visible(&self, user: &User) -> bool {
        self.scope.bypass || (self.scope.tenant_id.is_some() && user.tenant_id == self.scope.tenant_id)
    }

    /// Visible rows with staged writes layered over committed ones.
    fn rows(&self) -> Result<Vec<User>, ServiceError> {
        let mut state = self.store.state()?;
        state.channel_queries += 1;
        let mut rows: HashMap<Uuid, User> = state.users.clone();
        drop(state);

        rows.extend(self.staged.clone());
        Ok(rows.into_values().filter(|u| self.visible(u)).collect())
    }

    fn row(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.rows()?.into_iter().find(|u| u.user_id == user_id))
    }
}

#[async_trait]
impl ScopedChannel for MemoryChannel {
    fn scope(&self) -> &TenantScope {
        &self.scope
    }

    async fn read_back(&mut self) -> Result<ScopeSnapshot, ServiceError> {
        self.store.state()?.channel_queries += 1;
        let settings = self.scope.settings();
        let [tenant_id, role, department_id, team_id, bypass] =
            settings.map(|(_, value)| Some(value));
        Ok(ScopeSnapshot::from_settings(
            tenant_id,
            role,
            department_id,
            team_id,
            bypass,
        ))
    }

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        self.row(user_id)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.rows()?.into_iter().find(|u| u.email == email))
    }

    async fn find_users_by_phone_index(&mut self, index: &str) -> Result<Vec<User>, ServiceError> {
        let mut found: Vec<User> = self
            .rows()?
            .into_iter()
            .filter(|u| !u.is_deleted() && u.phone_index.as_deref() == Some(index))
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), ServiceError> {
        if !self.visible(user) {
            return Err(ServiceError::database(anyhow::anyhow!(
                "new row violates row-level security policy for table \"users\""
            )));
        }

        let mut state = self.store.state()?;
        state.channel_queries += 1;
        let taken = state.email_taken(&user.email, None)
            || self.staged.values().any(|u| u.email == user.email);
        drop(state);

        if taken {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        self.staged.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn revive_user(&mut self, user: &User) -> Result<bool, ServiceError> {
        match self.row(user.user_id)? {
            Some(existing) if existing.is_deleted() && self.visible(user) => {
                let mut revived = user.clone();
                revived.deleted_utc = None;
                revived.created_utc = existing.created_utc;
                revived.updated_utc = Utc::now();
                self.staged.insert(revived.user_id, revived);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_user(
        &mut self,
        user_id: Uuid,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, ServiceError> {
        match self.row(user_id)? {
            Some(mut user) if !user.is_deleted() => {
                update.apply(&mut user);
                self.staged.insert(user_id, user.clone());
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete_user(&mut self, user_id: Uuid) -> Result<bool, ServiceError> {
        match self.row(user_id)? {
            Some(mut user) if !user.is_deleted() => {
                let now = Utc::now();
                user.deleted_utc = Some(now);
                user.updated_utc = now;
                self.staged.insert(user_id, user);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let mut state = self.store.state()?;
        state.channel_queries += 1;
        Ok(state.tenants.get(&tenant_id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let this = *self;
        let mut state = this.store.state()?;
        state.users.extend(this.staged);
        state.releases.push(true);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        self.store.raw().releases.push(false);
        Ok(())
    }
}
