//! Serves objects from the local disk backend through signed links.
//! Streams object bodies to avoid buffering in memory.

use crate::{errors::AppError, services::object_store::signing::SignatureError, state::AppState};
use axum::{
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Query parameters carried by a signed link.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub signature: String,
}

/// `GET /objects/{*key}?expires=&signature=`
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    query: Result<Query<SignedLinkQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let store = state
        .local_objects
        .as_ref()
        .ok_or_else(|| AppError::not_found("object serving is not enabled"))?;
    let Ok(Query(link)) = query else {
        return Err(AppError::forbidden("missing signature"));
    };

    store
        .verify_link(&key, link.expires, &link.signature)
        .map_err(|err| {
            tracing::debug!(%key, error = %err, "rejected object link");
            match err {
                SignatureError::Expired => AppError::forbidden("link expired"),
                SignatureError::Invalid => AppError::forbidden("invalid signature"),
            }
        })?;

    let (file, content_type, size) = store.open(&key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));

    Ok(response)
}
