use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;

pub use repo::{Announcement, AnnouncementRepo, Audience, NewAnnouncement};

pub fn router() -> Router<AppState> {
    handlers::announcement_routes()
}
