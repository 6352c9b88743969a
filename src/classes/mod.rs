use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;

pub use repo::{Class, ClassRepo, NewClass};

pub fn router() -> Router<AppState> {
    handlers::class_routes()
}
