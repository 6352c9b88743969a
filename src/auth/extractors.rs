use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::{Claims, JwtKeys};
use crate::{error::AppError, types::Role};

/// Static allowed-role set of an operation.
pub trait RoleSet: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AnyRole;
pub struct StudentOnly;
pub struct StaffOnly;
pub struct AdminOnly;

impl RoleSet for AnyRole {
    const ALLOWED: &'static [Role] = &[Role::Student, Role::Teacher, Role::Admin];
}

impl RoleSet for StudentOnly {
    const ALLOWED: &'static [Role] = &[Role::Student];
}

impl RoleSet for StaffOnly {
    const ALLOWED: &'static [Role] = &[Role::Teacher, Role::Admin];
}

impl RoleSet for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Pulls the token out of a `Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub fn authenticate(keys: &JwtKeys, header: Option<&str>) -> Result<Claims, AppError> {
    let token = header
        .and_then(bearer_token)
        .ok_or(AppError::Unauthenticated)?;
    keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::Unauthenticated
    })
}

/// Fails closed: a missing role is never allowed.
pub fn authorize(claims: &Claims, allowed: &[Role]) -> Result<(), AppError> {
    match claims.role {
        Some(role) if allowed.contains(&role) => Ok(()),
        role => {
            warn!(user_id = claims.user_id, role = ?role, "role not permitted");
            Err(AppError::Forbidden)
        }
    }
}

/// Authenticated caller whose role is in `R::ALLOWED`.
pub struct Auth<R: RoleSet>(pub Claims, pub PhantomData<R>);

impl<R: RoleSet> Auth<R> {
    pub fn user_id(&self) -> i64 {
        self.0.user_id
    }

    /// `Forbidden` if the token carried no role.
    pub fn role(&self) -> Result<Role, AppError> {
        self.0.role.ok_or(AppError::Forbidden)
    }
}

#[async_trait]
impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: Send + Sync,
    R: RoleSet,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let claims = authenticate(&keys, header)?;
        authorize(&claims, R::ALLOWED)?;
        Ok(Self(claims, PhantomData))
    }
}
