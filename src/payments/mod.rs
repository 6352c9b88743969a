use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod ledger;

pub use ledger::{NewPayment, PaymentLedger, PaymentRecord, PaymentStatus};

pub fn router() -> Router<AppState> {
    handlers::payment_routes()
}
