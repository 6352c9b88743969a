use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

pub use repo::UserRepo;
pub use repo_types::{NewUser, User, UserPatch, UserWithHash};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::me_routes())
        .merge(handlers::admin_routes())
}
