use serde::{Deserialize, Serialize};

use crate::{types::Role, users::User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Request body for login. `identifier` may be a username or an email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}
