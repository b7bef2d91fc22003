//! Registration, login and session cookie handlers.

use crate::{
    errors::AppError,
    middleware::auth_gate::{
        ACCESS_COOKIE, AuthenticatedUser, REFRESH_COOKIE, access_cookie, clear_session_cookies, refresh_cookie,
    },
    services::session_manager::TokenClass,
    state::AppState,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[garde(length(min = 3, max = 64))]
    pub username: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 6, max = 1024))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    state
        .credentials
        .verify(&payload.username, &payload.password)
        .await?;

    let access = state.sessions.issue_access_token(&payload.username)?;
    let refresh = state.sessions.issue_refresh_token(&payload.username)?;
    tracing::info!(username = %payload.username, "login succeeded");

    let jar = jar
        .add(access_cookie(access, state.cookie_secure))
        .add(refresh_cookie(refresh, state.cookie_secure));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Login successful",
        }),
    ))
}

/// `POST /create`
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    state
        .credentials
        .register(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created successfully",
        }),
    ))
}

/// `POST /refresh` and `POST /refresh-token`
///
/// Issues a new access token; the refresh token itself is left as is.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::unauthorized("missing refresh token"))?;

    let access = state.sessions.rotate(&token)?;
    tracing::debug!("access token refreshed");

    Ok((
        jar.add(access_cookie(access, state.cookie_secure)),
        Json(MessageResponse {
            message: "Access token refreshed",
        }),
    ))
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if state.revoke_on_logout {
        if let Some(token) = jar.get(ACCESS_COOKIE) {
            state.sessions.revoke(token.value(), TokenClass::Access);
        }
        if let Some(token) = jar.get(REFRESH_COOKIE) {
            state.sessions.revoke(token.value(), TokenClass::Refresh);
        }
    }

    (
        clear_session_cookies(jar),
        Json(MessageResponse {
            message: "Logout successful",
        }),
    )
}

/// `GET /me`
pub async fn me(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        username: user.username,
    })
}
