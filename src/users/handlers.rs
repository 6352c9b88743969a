use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{AdminUpdateUserRequest, CreateUserRequest, UpdateProfileRequest},
    repo_types::{NewUser, User},
};
use crate::{
    auth::extractors::{AdminOnly, AnyRole, Auth},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(update_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", patch(update_user).delete(delete_user))
}

#[instrument(skip(state, auth), fields(user_id = auth.user_id()))]
pub async fn get_me(State(state): State<AppState>, auth: Auth<AnyRole>) -> AppResult<Json<User>> {
    let user = state
        .users
        .find_by_id(auth.user_id())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(user))
}

#[instrument(skip(state, auth, payload), fields(user_id = auth.user_id()))]
pub async fn update_me(
    State(state): State<AppState>,
    auth: Auth<AnyRole>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    state.users.update(auth.user_id(), payload.into()).await?;
    let user = state
        .users
        .find_by_id(auth.user_id())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(user))
}

#[instrument(skip(state, _auth))]
pub async fn list_users(
    State(state): State<AppState>,
    _auth: Auth<AdminOnly>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.list().await?))
}

#[instrument(skip(state, auth, payload), fields(admin_id = auth.user_id()))]
pub async fn create_user(
    State(state): State<AppState>,
    auth: Auth<AdminOnly>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let new = NewUser {
        username: payload.username,
        email: payload.email,
        name: payload.name,
        role: payload.role,
    };
    let user = state.users.create(new, &payload.password).await?;
    info!(user_id = user.id, role = %user.role, "user created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, auth, payload), fields(admin_id = auth.user_id()))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: Auth<AdminOnly>,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<AdminUpdateUserRequest>,
) -> AppResult<Json<User>> {
    state.users.update(id, payload.into()).await?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(user))
}

#[instrument(skip(state, auth), fields(admin_id = auth.user_id()))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: Auth<AdminOnly>,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    if state.users.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("user"))
    }
}
