use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::dto::{AuthResponse, LoginRequest, RegisterRequest},
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
    types::Role,
    users::{NewUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

fn auth_response(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let token = state.keys.issue(&user)?;
    Ok(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.keys.ttl().whole_seconds(),
        user,
    })
}

/// Self-registration. Admin accounts come from an admin or the bootstrap config.
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let role = payload.role.unwrap_or(Role::Student);
    if role == Role::Admin {
        warn!("self-registration as admin refused");
        return Err(AppError::Forbidden);
    }

    let new = NewUser {
        username: payload.username,
        email: payload.email,
        name: payload.name,
        role,
    };
    let user = match state.users.create(new, &payload.password).await {
        Ok(u) => u,
        Err(AppError::DuplicateIdentity) => {
            warn!("registration collided with an existing identity");
            return Err(AppError::DuplicateIdentity);
        }
        Err(e) => return Err(e),
    };

    info!(user_id = user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(auth_response(&state, user)?)))
}

/// Unknown identifiers and wrong passwords are indistinguishable to the caller.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let credentials = state.users.credentials();
    let found = state
        .users
        .find_by_identifier_with_secret(&payload.identifier)
        .await?;

    let Some(found) = found else {
        credentials.verify_dummy(&payload.password).await?;
        warn!("login for unknown identifier");
        return Err(AppError::Unauthenticated);
    };

    if !credentials
        .verify(&payload.password, &found.password_hash)
        .await?
    {
        warn!(user_id = found.user.id, "login invalid password");
        return Err(AppError::Unauthenticated);
    }

    let user = state
        .users
        .record_login(found.user.id)
        .await?
        .unwrap_or(found.user);

    info!(user_id = user.id, role = %user.role, "user logged in");
    Ok(Json(auth_response(&state, user)?))
}
