use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::ledger::{EnrollOutcome, EnrollmentWithClass, RosterEntry};
use crate::{
    auth::{Auth, StaffOnly, StudentOnly},
    error::{AppError, AppResult},
    extract::AppPath,
    state::AppState,
};

pub fn enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/classes/:id/enroll", post(enroll).delete(unenroll))
        .route("/classes/:id/students", get(class_roster))
        .route("/me/enrollments", get(my_enrollments))
}

/// 201 when a row was created, 200 when the student was already enrolled.
#[instrument(skip(state, auth), fields(student_id = auth.user_id()))]
pub async fn enroll(
    State(state): State<AppState>,
    auth: Auth<StudentOnly>,
    AppPath(class_id): AppPath<i64>,
) -> AppResult<(StatusCode, Json<EnrollOutcome>)> {
    let outcome = state.enrollments.enroll(class_id, auth.user_id()).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

#[instrument(skip(state, auth), fields(student_id = auth.user_id()))]
pub async fn unenroll(
    State(state): State<AppState>,
    auth: Auth<StudentOnly>,
    AppPath(class_id): AppPath<i64>,
) -> AppResult<StatusCode> {
    if state.enrollments.unenroll(class_id, auth.user_id()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("enrollment"))
    }
}

#[instrument(skip(state, auth), fields(student_id = auth.user_id()))]
pub async fn my_enrollments(
    State(state): State<AppState>,
    auth: Auth<StudentOnly>,
) -> AppResult<Json<Vec<EnrollmentWithClass>>> {
    Ok(Json(state.enrollments.list_for_student(auth.user_id()).await?))
}

#[instrument(skip(state, _auth))]
pub async fn class_roster(
    State(state): State<AppState>,
    _auth: Auth<StaffOnly>,
    AppPath(class_id): AppPath<i64>,
) -> AppResult<Json<Vec<RosterEntry>>> {
    Ok(Json(state.enrollments.list_for_class(class_id).await?))
}
