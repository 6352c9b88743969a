use crate::state::AppState;
use axum::Router;

mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;

pub use extractors::{authenticate, authorize, AdminOnly, AnyRole, Auth, RoleSet, StaffOnly, StudentOnly};
pub use jwt::{Claims, InvalidToken, JwtKeys};
pub use password::CredentialStore;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
