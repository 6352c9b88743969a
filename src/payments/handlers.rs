use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::ledger::{NewPayment, PaymentRecord, PaymentStatus};
use crate::{
    auth::{AdminOnly, Auth, StudentOnly},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

/// `amount_cents` must be a JSON integer; fractions are rejected during decoding.
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub student_id: i64,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub status: Option<PaymentStatus>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentFilter {
    pub student_id: Option<i64>,
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments).post(create_payment))
        .route("/payments/:id", patch(update_payment))
        .route("/me/payments", get(my_payments))
}

#[instrument(skip(state, auth, payload), fields(admin_id = auth.user_id()))]
pub async fn create_payment(
    State(state): State<AppState>,
    auth: Auth<AdminOnly>,
    AppJson(payload): AppJson<CreatePaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentRecord>)> {
    let record = state
        .payments
        .create(NewPayment {
            student_id: payload.student_id,
            amount_cents: payload.amount_cents,
            currency: payload.currency,
            status: payload.status,
            note: payload.note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state, _auth))]
pub async fn list_payments(
    State(state): State<AppState>,
    _auth: Auth<AdminOnly>,
    AppQuery(filter): AppQuery<PaymentFilter>,
) -> AppResult<Json<Vec<PaymentRecord>>> {
    let records = match filter.student_id {
        Some(student_id) => state.payments.list_for_student(student_id).await?,
        None => state.payments.list_all().await?,
    };
    Ok(Json(records))
}

#[instrument(skip(state, auth, payload), fields(admin_id = auth.user_id()))]
pub async fn update_payment(
    State(state): State<AppState>,
    auth: Auth<AdminOnly>,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdatePaymentRequest>,
) -> AppResult<Json<PaymentRecord>> {
    let record = state
        .payments
        .update_status(id, payload.status)
        .await?
        .ok_or_else(|| AppError::not_found("payment"))?;
    Ok(Json(record))
}

#[instrument(skip(state, auth), fields(student_id = auth.user_id()))]
pub async fn my_payments(
    State(state): State<AppState>,
    auth: Auth<StudentOnly>,
) -> AppResult<Json<Vec<PaymentRecord>>> {
    Ok(Json(state.payments.list_for_student(auth.user_id()).await?))
}
