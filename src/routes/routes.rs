//! Defines routes for the image catalog API.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `POST /login`, `POST /create`: sign in, register
//!   - `POST /refresh`, `POST /refresh-token`: exchange the refresh cookie for a new access cookie
//!   - `POST /logout`: clear session cookies
//!   - `GET  /healthz`, `GET /readyz`: probes
//!   - `GET  /objects/{*key}`: signed object links (local backend)
//!
//! - **Protected endpoints** (valid `access_token` cookie)
//!   - `GET  /me`
//!   - `GET  /categories`, `POST /categories`
//!   - `POST /imgupl`, `GET /images`, `GET /image/{id}`
//!   - `PUT  /imgupd/{id}`, `DELETE /imgdel/{id}`
//!
//! The wildcard `*key` allows nested keys like `images/<uuid>.png`.

use crate::{
    handlers::{
        auth_handlers::{create_user, login, logout, me, refresh},
        category_handlers::{create_category, list_categories},
        health_handlers::{healthz, readyz},
        image_handlers::{delete_image, get_image, list_images, update_image, upload_image},
        object_handlers::get_object,
    },
    middleware::auth_gate::require_session,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};

/// Build the full router, with session checks applied to protected routes
/// only.
///
/// `max_upload_bytes` bounds every request body on the protected routes.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/login", post(login))
        .route("/create", post(create_user))
        .route("/refresh", post(refresh))
        .route("/refresh-token", post(refresh))
        .route("/logout", post(logout))
        .route("/objects/{*key}", get(get_object));

    let protected = Router::new()
        .route("/me", get(me))
        .route("/categories", get(list_categories).post(create_category))
        .route("/imgupl", post(upload_image))
        .route("/images", get(list_images))
        .route("/image/{id}", get(get_image))
        .route("/imgupd/{id}", put(update_image))
        .route("/imgdel/{id}", delete(delete_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), require_session));

    public.merge(protected).with_state(state)
}
