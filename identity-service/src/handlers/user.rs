use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::user::{CreateUserRequest, PhoneSearchQuery, UserListResponse},
    middleware::{AuthUser, ScopedSession},
    models::{UpdateUserRequest, User, UserResponse},
    services::ProvisionOutcome,
    utils::ValidatedJson,
    AppState,
};

fn with_phone(state: &AppState, user: User) -> Result<UserResponse, AppError> {
    let phone = state.user_service.decrypt_phone(&user)?;
    Ok(UserResponse::from(user).with_phone(phone))
}

/// Current principal, read through the tenant-scoped channel.
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    session: ScopedSession,
) -> Result<Json<UserResponse>, AppError> {
    let mut channel = session.channel().await?;
    let user = state
        .user_service
        .current_user(&identity, &mut *channel)
        .await?;

    Ok(Json(with_phone(&state, user)?))
}

/// 201 for a fresh record, 200 when a soft-deleted record was revived.
///
/// Hashing and sealing happen before the scoped channel is first taken.
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    session: ScopedSession,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let prepared = state.user_service.prepare_user(&identity, req).await?;

    let mut channel = session.channel().await?;
    let outcome = state
        .user_service
        .provision_user(&identity, &mut *channel, prepared)
        .await?;

    let (status, user) = match outcome {
        ProvisionOutcome::Created(u) => (StatusCode::CREATED, u),
        ProvisionOutcome::Revived(u) => (StatusCode::OK, u),
    };

    Ok((status, Json(with_phone(&state, user)?)))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    session: ScopedSession,
    Path(user_id): Path<Uuid>,
    ValidatedJson(update): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut channel = session.channel().await?;
    let user = state
        .user_service
        .update_user(&identity, &mut *channel, user_id, update)
        .await?;

    Ok(Json(with_phone(&state, user)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    session: ScopedSession,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut channel = session.channel().await?;
    state
        .user_service
        .soft_delete_user(&identity, &mut *channel, user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Exact phone match through the blind index. Only rows visible in the
/// caller's scope are returned.
pub async fn search_users(
    State(state): State<AppState>,
    session: ScopedSession,
    Query(query): Query<PhoneSearchQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    query.validate()?;

    let mut channel = session.channel().await?;
    let found = state
        .user_service
        .search_by_phone(&mut *channel, &query.phone)
        .await?;

    let users = found
        .into_iter()
        .map(|u| with_phone(&state, u))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(UserListResponse { users }))
}
