use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::repo::{Class, NewClass};
use crate::{
    auth::{AdminOnly, AnyRole, Auth, StaffOnly},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    state::AppState,
    types::Role,
};

pub fn class_routes() -> Router<AppState> {
    Router::new()
        .route("/classes", get(list_classes).post(create_class))
        .route("/classes/:id", get(get_class).delete(delete_class))
}

#[instrument(skip(state, _auth))]
pub async fn list_classes(
    State(state): State<AppState>,
    _auth: Auth<AnyRole>,
) -> AppResult<Json<Vec<Class>>> {
    Ok(Json(state.classes.list().await?))
}

#[instrument(skip(state, _auth))]
pub async fn get_class(
    State(state): State<AppState>,
    _auth: Auth<AnyRole>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Class>> {
    let class = state
        .classes
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("class"))?;
    Ok(Json(class))
}

/// Teachers always own the classes they create; admins may assign any teacher.
#[instrument(skip(state, auth, payload), fields(user_id = auth.user_id()))]
pub async fn create_class(
    State(state): State<AppState>,
    auth: Auth<StaffOnly>,
    AppJson(mut payload): AppJson<NewClass>,
) -> AppResult<(StatusCode, Json<Class>)> {
    if auth.role()? == Role::Teacher {
        payload.teacher_id = Some(auth.user_id());
    }
    let class = state.classes.create(payload).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

#[instrument(skip(state, _auth))]
pub async fn delete_class(
    State(state): State<AppState>,
    _auth: Auth<AdminOnly>,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    if state.classes.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("class"))
    }
}
