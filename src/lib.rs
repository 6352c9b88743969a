pub mod announcements;
pub mod app;
pub mod attendance;
pub mod auth;
pub mod classes;
pub mod config;
pub mod db;
pub mod enrollments;
pub mod error;
pub mod extract;
pub mod payments;
pub mod state;
pub mod types;
pub mod users;
