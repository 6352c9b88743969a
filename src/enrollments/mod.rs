use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod ledger;

pub use ledger::{EnrollOutcome, EnrollmentLedger};

pub fn router() -> Router<AppState> {
    handlers::enrollment_routes()
}
