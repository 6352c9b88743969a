use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod ledger;

pub use ledger::{AttendanceLedger, AttendanceRecord, AttendanceStatus};

pub fn router() -> Router<AppState> {
    handlers::attendance_routes()
}
