//! Tenant-scoped user administration. Every storage operation runs on the
//! request's scoped channel and is filtered through the role hierarchy.

use uuid::Uuid;

use crate::{
    dtos::user::CreateUserRequest,
    models::{
        assignable_roles, normalize_email, normalize_phone, role_level, IdentityContext,
        UpdateUserRequest, User,
    },
    services::{ScopedChannel, ServiceError},
    utils::{CredentialHasher, FieldCipher, Password},
};

#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    Created(User),
    Revived(User),
}

/// A credential record ready to be written: role checked, password hashed and
/// phone sealed. Built without any storage channel.
#[derive(Debug, Clone)]
pub struct PreparedUser {
    user: User,
}

#[derive(Clone)]
pub struct UserService {
    hasher: CredentialHasher,
    cipher: FieldCipher,
}

impl UserService {
    pub fn new(hasher: CredentialHasher, cipher: FieldCipher) -> Self {
        Self { hasher, cipher }
    }

    pub fn decrypt_phone(&self, user: &User) -> Result<Option<String>, ServiceError> {
        user.phone_encrypted
            .as_deref()
            .map(|envelope| self.cipher.decrypt(envelope))
            .transpose()
            .map_err(ServiceError::from)
    }

    pub async fn current_user(
        &self,
        actor: &IdentityContext,
        channel: &mut dyn ScopedChannel,
    ) -> Result<User, ServiceError> {
        channel
            .find_user(actor.user_id)
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(ServiceError::UserNotFound)
    }

    /// Check the requested role and do the CPU-bound work of provisioning.
    /// Runs before a storage channel is taken.
    pub async fn prepare_user(
        &self,
        actor: &IdentityContext,
        req: CreateUserRequest,
    ) -> Result<PreparedUser, ServiceError> {
        let tenant_id = actor.tenant_id.ok_or(ServiceError::TenantMismatch)?;
        if !assignable_roles(&actor.role).contains(&req.role) {
            return Err(ServiceError::InsufficientRole);
        }

        let mut user = User::new(Some(tenant_id), normalize_email(&req.email), req.role);
        user.display_name = req.display_name;
        user.department_id = req.department_id;
        user.team_id = req.team_id;

        if let Some(password) = req.password {
            let hash = self.hasher.hash_blocking(Password::new(password)).await?;
            user.password_hash = Some(hash.into_string());
        }
        let phone = req.phone.as_deref().map(normalize_phone).unwrap_or_default();
        if !phone.is_empty() {
            let sealed = self.cipher.seal(&phone)?;
            user.phone_encrypted = Some(sealed.ciphertext);
            user.phone_index = Some(sealed.blind_index);
        }

        Ok(PreparedUser { user })
    }

    /// Write a prepared record in the actor's tenant, or revive a soft-deleted
    /// record of the same tenant with that email.
    pub async fn provision_user(
        &self,
        actor: &IdentityContext,
        channel: &mut dyn ScopedChannel,
        prepared: PreparedUser,
    ) -> Result<ProvisionOutcome, ServiceError> {
        let mut user = prepared.user;
        let tenant_id = user.tenant_id.ok_or(ServiceError::TenantMismatch)?;

        // Records of other tenants are invisible here; a clash with one of them
        // surfaces as a unique violation on insert.
        match channel.find_user_by_email(&user.email).await? {
            None => {
                channel.insert_user(&user).await?;
                tracing::info!(
                    user_id = %user.user_id,
                    tenant_id = %tenant_id,
                    role = %user.role,
                    actor = %actor.user_id,
                    "User provisioned"
                );
                Ok(ProvisionOutcome::Created(user))
            }
            Some(previous) if previous.is_deleted() && previous.tenant_id == Some(tenant_id) => {
                user.user_id = previous.user_id;
                user.created_utc = previous.created_utc;
                if !channel.revive_user(&user).await? {
                    return Err(ServiceError::EmailAlreadyRegistered);
                }
                tracing::info!(
                    user_id = %user.user_id,
                    tenant_id = %tenant_id,
                    actor = %actor.user_id,
                    "Soft-deleted user revived"
                );
                Ok(ProvisionOutcome::Revived(user))
            }
            Some(_) => Err(ServiceError::EmailAlreadyRegistered),
        }
    }

    /// Target must be live, in the actor's tenant and strictly below the actor.
    async fn managed_target(
        &self,
        actor: &IdentityContext,
        channel: &mut dyn ScopedChannel,
        target_id: Uuid,
    ) -> Result<User, ServiceError> {
        let target = channel
            .find_user(target_id)
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(ServiceError::UserNotFound)?;

        if actor.tenant_id.is_none() || target.tenant_id != actor.tenant_id {
            return Err(ServiceError::TenantMismatch);
        }
        if role_level(&target.role) >= role_level(&actor.role) {
            return Err(ServiceError::InsufficientRole);
        }
        Ok(target)
    }

    pub async fn update_user(
        &self,
        actor: &IdentityContext,
        channel: &mut dyn ScopedChannel,
        target_id: Uuid,
        update: UpdateUserRequest,
    ) -> Result<User, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::Validation("No fields to update".to_string()));
        }
        if let Some(role) = update.role {
            if !assignable_roles(&actor.role).contains(&role) {
                return Err(ServiceError::InsufficientRole);
            }
        }

        self.managed_target(actor, channel, target_id).await?;
        let updated = channel
            .update_user(target_id, &update)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(user_id = %target_id, actor = %actor.user_id, "User updated");
        Ok(updated)
    }

    pub async fn soft_delete_user(
        &self,
        actor: &IdentityContext,
        channel: &mut dyn ScopedChannel,
        target_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.managed_target(actor, channel, target_id).await?;
        if !channel.soft_delete_user(target_id).await? {
            return Err(ServiceError::UserNotFound);
        }

        tracing::info!(user_id = %target_id, actor = %actor.user_id, "User soft-deleted");
        Ok(())
    }

    /// Equality search on the phone column through its blind index.
    pub async fn search_by_phone(
        &self,
        channel: &mut dyn ScopedChannel,
        phone: &str,
    ) -> Result<Vec<User>, ServiceError> {
        let index = self.cipher.blind_index(&normalize_phone(phone))?;
        if index.is_empty() {
            return Ok(Vec::new());
        }
        channel.find_users_by_phone_index(&index).await
    }
}
