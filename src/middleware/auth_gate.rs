//! Session gate for protected routes.
//!
//! Reads the `access_token` cookie, verifies it as an access token and hands
//! the subject to handlers through [`AuthenticatedUser`].

use crate::{
    errors::AppError,
    services::session_manager::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, TokenClass},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
/// The refresh cookie is only sent to this path.
pub const REFRESH_COOKIE_PATH: &str = "/refresh-token";

/// Subject of the verified access token on the current request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Reject requests without a valid, unexpired access token.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::unauthorized("missing access token"))?;

    let claims = state.sessions.verify(&token, TokenClass::Access)?;
    tracing::debug!(subject = %claims.sub, "session verified");

    request
        .extensions_mut()
        .insert(AuthenticatedUser { username: claims.sub });
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("missing access token"))
    }
}

pub fn access_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ACCESS_TOKEN_TTL_SECS))
        .build()
}

pub fn refresh_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(REFRESH_TOKEN_TTL_SECS))
        .build()
}

/// Overwrite both session cookies with empty, already-expired values.
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    let expired = |name: &'static str, path: &'static str| {
        Cookie::build((name, ""))
            .path(path)
            .http_only(true)
            .max_age(time::Duration::ZERO)
            .build()
    };
    jar.add(expired(ACCESS_COOKIE, "/"))
        .add(expired(REFRESH_COOKIE, REFRESH_COOKIE_PATH))
}
