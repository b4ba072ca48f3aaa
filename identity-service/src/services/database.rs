//! PostgreSQL implementation of the storage seams.
//!
//! Tenant-scoped work runs on a transaction whose first statement binds the
//! scope with transaction-local `set_config`. Pre-scope credential lookups run
//! in their own short transaction with the bypass flag set, since the row-level
//! policy hides every row from an unscoped session.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{PgConnection, Transaction};
use uuid::Uuid;

use super::store::{CredentialStore, TenantStore};
use super::tenant_scope::{ScopeBinder, ScopeSnapshot, ScopedChannel, TenantScope};
use super::ServiceError;
use crate::models::{Tenant, UpdateUserRequest, User};

const BIND_SCOPE_SQL: &str = "SELECT set_config($1, $2, true), set_config($3, $4, true), \
     set_config($5, $6, true), set_config($7, $8, true), set_config($9, $10, true)";

const USER_COLUMNS: &str = "user_id, tenant_id, email, password_hash, external_id, display_name, \
     role, department_id, team_id, is_active, phone_encrypted, phone_index, last_login_utc, \
     deleted_utc, created_utc, updated_utc";

const UNIQUE_VIOLATION: &str = "23505";

fn db_error(e: sqlx::Error) -> ServiceError {
    if let sqlx::Error::Database(ref db) = e {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return ServiceError::EmailAlreadyRegistered;
        }
    }
    ServiceError::database(e)
}

async fn bind_scope(conn: &mut PgConnection, scope: &TenantScope) -> Result<(), ServiceError> {
    let settings = scope.settings();
    let mut query = sqlx::query(BIND_SCOPE_SQL);
    for (name, value) in settings {
        query = query.bind(name).bind(value);
    }
    query.execute(conn).await.map_err(db_error)?;
    Ok(())
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn system_tx(&self) -> Result<Transaction<'static, Postgres>, ServiceError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        bind_scope(
            &mut tx,
            &TenantScope {
                tenant_id: None,
                role: "system".to_string(),
                department_id: None,
                team_id: None,
                bypass: true,
            },
        )
        .await?;
        Ok(tx)
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> Result<Option<User>, ServiceError> {
        let mut tx = self.system_tx().await?;
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, filter);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(user)
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        self.fetch_user("email = $1 AND deleted_utc IS NULL", email)
            .await
    }

    async fn find_any_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        self.fetch_user("email = $1", email).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        self.fetch_user("user_id = $1::uuid", &user_id.to_string())
            .await
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut tx = self.system_tx().await?;
        insert_user(&mut tx, user).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn link_external_identity(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> Result<(), ServiceError> {
        let mut tx = self.system_tx().await?;
        let result = sqlx::query(
            "UPDATE users SET external_id = $2, password_hash = NULL, updated_utc = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(external_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::UserNotFound);
        }
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.system_tx().await?;
        sqlx::query("UPDATE users SET last_login_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                ServiceError::database(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl TenantStore for Database {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT tenant_id, tenant_slug, tenant_label, tenant_state_code, deleted_utc, created_utc \
             FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl ScopeBinder for Database {
    async fn bind(&self, scope: &TenantScope) -> Result<Box<dyn ScopedChannel>, ServiceError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        bind_scope(&mut tx, scope).await?;
        Ok(Box::new(PgScopedChannel {
            tx,
            scope: scope.clone(),
        }))
    }
}

async fn insert_user(conn: &mut PgConnection, user: &User) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO users (user_id, tenant_id, email, password_hash, external_id, display_name, \
         role, department_id, team_id, is_active, phone_encrypted, phone_index, created_utc, updated_utc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(user.user_id)
    .bind(user.tenant_id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.external_id)
    .bind(&user.display_name)
    .bind(&user.role)
    .bind(user.department_id)
    .bind(user.team_id)
    .bind(user.is_active)
    .bind(&user.phone_encrypted)
    .bind(&user.phone_index)
    .bind(user.created_utc)
    .bind(user.updated_utc)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// A pooled connection inside a transaction with a bound scope. Dropping it
/// without commit rolls the transaction back.
pub struct PgScopedChannel {
    tx: Transaction<'static, Postgres>,
    scope: TenantScope,
}

#[async_trait]
impl ScopedChannel for PgScopedChannel {
    fn scope(&self) -> &TenantScope {
        &self.scope
    }

    async fn read_back(&mut self) -> Result<ScopeSnapshot, ServiceError> {
        let row: (Option<String>, Option<String>, Option<String>, Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT current_setting('app.tenant_id', true), current_setting('app.role', true), \
                 current_setting('app.department_id', true), current_setting('app.team_id', true), \
                 current_setting('app.bypass_rls', true)",
            )
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error)?;

        Ok(ScopeSnapshot::from_settings(row.0, row.1, row.2, row.3, row.4))
    }

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn find_users_by_phone_index(&mut self, index: &str) -> Result<Vec<User>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM users WHERE phone_index = $1 AND deleted_utc IS NULL ORDER BY email",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(index)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), ServiceError> {
        insert_user(&mut self.tx, user).await
    }

    async fn revive_user(&mut self, user: &User) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_utc = NULL, is_active = TRUE, password_hash = $2, \
             external_id = NULL, display_name = $3, role = $4, department_id = $5, team_id = $6, \
             phone_encrypted = $7, phone_index = $8, updated_utc = NOW() \
             WHERE user_id = $1 AND deleted_utc IS NOT NULL",
        )
        .bind(user.user_id)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.role)
        .bind(user.department_id)
        .bind(user.team_id)
        .bind(&user.phone_encrypted)
        .bind(&user.phone_index)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_user(
        &mut self,
        user_id: Uuid,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, ServiceError> {
        let sql = format!(
            "UPDATE users SET role = COALESCE($2, role), is_active = COALESCE($3, is_active), \
             department_id = COALESCE($4, department_id), team_id = COALESCE($5, team_id), \
             display_name = COALESCE($6, display_name), updated_utc = NOW() \
             WHERE user_id = $1 AND deleted_utc IS NULL RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(update.role.map(|r| r.as_str()))
            .bind(update.is_active)
            .bind(update.department_id)
            .bind(update.team_id)
            .bind(&update.display_name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn soft_delete_user(&mut self, user_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_utc = NOW(), updated_utc = NOW() \
             WHERE user_id = $1 AND deleted_utc IS NULL",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT tenant_id, tenant_slug, tenant_label, tenant_state_code, deleted_utc, created_utc \
             FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        self.tx.rollback().await.map_err(db_error)
    }
}
