use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;

use super::repo::{Announcement, NewAnnouncement};
use crate::{
    auth::{AdminOnly, AnyRole, Auth, StaffOnly},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn announcement_routes() -> Router<AppState> {
    Router::new()
        .route("/announcements", get(list_announcements).post(create_announcement))
        .route("/announcements/:id", delete(delete_announcement))
}

#[instrument(skip(state, auth), fields(user_id = auth.user_id()))]
pub async fn list_announcements(
    State(state): State<AppState>,
    auth: Auth<AnyRole>,
) -> AppResult<Json<Vec<Announcement>>> {
    let role = auth.role()?;
    Ok(Json(state.announcements.list_visible_to(role).await?))
}

#[instrument(skip(state, auth, payload), fields(user_id = auth.user_id()))]
pub async fn create_announcement(
    State(state): State<AppState>,
    auth: Auth<StaffOnly>,
    AppJson(payload): AppJson<NewAnnouncement>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    let announcement = state.announcements.create(auth.user_id(), payload).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

#[instrument(skip(state, _auth))]
pub async fn delete_announcement(
    State(state): State<AppState>,
    _auth: Auth<AdminOnly>,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    if state.announcements.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("announcement"))
    }
}
