use serde::Deserialize;

use super::repo_types::UserPatch;
use crate::types::Role;

/// Self-service profile update. Role is not editable here.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

impl From<UpdateProfileRequest> for UserPatch {
    fn from(r: UpdateProfileRequest) -> Self {
        UserPatch {
            username: r.username,
            email: r.email,
            name: r.name,
            role: None,
            password: r.password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminUpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl From<AdminUpdateUserRequest> for UserPatch {
    fn from(r: AdminUpdateUserRequest) -> Self {
        UserPatch {
            username: r.username,
            email: r.email,
            name: r.name,
            role: r.role,
            password: r.password,
        }
    }
}
