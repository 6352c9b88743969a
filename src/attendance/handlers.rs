use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use time::Date;
use tracing::instrument;

use super::ledger::{AttendanceRecord, AttendanceStatus};
use crate::{
    auth::{Auth, StaffOnly, StudentOnly},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
    types::iso_date,
};

#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    pub class_id: i64,
    pub student_id: i64,
    /// `YYYY-MM-DD`; today when absent.
    pub date: Option<String>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct DateFilter {
    pub date: Option<String>,
}

fn parse_date(raw: Option<&str>) -> AppResult<Option<Date>> {
    raw.map(|d| {
        iso_date::parse(d).map_err(|_| AppError::validation("date must be YYYY-MM-DD"))
    })
    .transpose()
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance", post(mark_attendance))
        .route("/me/attendance", get(my_attendance))
        .route("/students/:id/attendance", get(student_attendance))
        .route("/classes/:id/attendance", get(class_attendance))
}

#[instrument(skip(state, auth, payload), fields(marked_by = auth.user_id()))]
pub async fn mark_attendance(
    State(state): State<AppState>,
    auth: Auth<StaffOnly>,
    AppJson(payload): AppJson<MarkAttendanceRequest>,
) -> AppResult<Json<AttendanceRecord>> {
    let date = parse_date(payload.date.as_deref())?;
    let record = state
        .attendance
        .mark(payload.class_id, payload.student_id, date, payload.status)
        .await?;
    Ok(Json(record))
}

#[instrument(skip(state, auth), fields(student_id = auth.user_id()))]
pub async fn my_attendance(
    State(state): State<AppState>,
    auth: Auth<StudentOnly>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(state.attendance.list_for_student(auth.user_id()).await?))
}

#[instrument(skip(state, _auth))]
pub async fn student_attendance(
    State(state): State<AppState>,
    _auth: Auth<StaffOnly>,
    AppPath(student_id): AppPath<i64>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(state.attendance.list_for_student(student_id).await?))
}

#[instrument(skip(state, _auth))]
pub async fn class_attendance(
    State(state): State<AppState>,
    _auth: Auth<StaffOnly>,
    AppPath(class_id): AppPath<i64>,
    AppQuery(filter): AppQuery<DateFilter>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    let date = parse_date(filter.date.as_deref())?;
    Ok(Json(state.attendance.list_for_class(class_id, date).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_only_iso_days() {
        assert!(parse_date(None).unwrap().is_none());
        assert!(parse_date(Some("2026-02-28")).unwrap().is_some());
        assert!(matches!(parse_date(Some("2026-02-30")), Err(AppError::Validation(_))));
        assert!(matches!(parse_date(Some("yesterday")), Err(AppError::Validation(_))));
    }

    #[test]
    fn unknown_status_is_rejected_at_the_boundary() {
        let body = r#"{"class_id":1,"student_id":2,"status":"asleep"}"#;
        assert!(serde_json::from_str::<MarkAttendanceRequest>(body).is_err());
        let body = r#"{"class_id":1,"student_id":2,"status":"late"}"#;
        let req: MarkAttendanceRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.status, AttendanceStatus::Late);
        assert!(req.date.is_none());
    }
}
