//! HTTP handlers for the image catalog.
//!
//! Uploads and updates arrive as form data; everything that touches both
//! stores is delegated to `AssetService`.

use crate::{
    errors::AppError,
    models::asset::{AssetPatch, ImageAsset, NewAsset, SignedAsset, SignedListing},
    state::AppState,
};
use axum::{
    Form, Json,
    extract::{
        FromRequest, Multipart, Path, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection},
    },
    http::header,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: i64,
    pub object_key: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

/// Raw update fields as sent by the client. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateForm {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
}

impl UpdateForm {
    fn set(&mut self, field: &str, value: String) {
        match field {
            "name" => self.name = Some(value),
            "category_id" => self.category_id = Some(value),
            "description" => self.description = Some(value),
            _ => {}
        }
    }

    pub fn into_patch(self) -> Result<AssetPatch, AppError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let category_id = match non_empty(self.category_id) {
            Some(raw) => Some(parse_category_id(&raw)?),
            None => None,
        };
        Ok(AssetPatch {
            name: non_empty(self.name),
            category_id,
            description: non_empty(self.description),
        })
    }
}

fn parse_category_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::validation("invalid category ID"))
}

/// Keeps the status multer reports, so an oversized body stays a 413.
fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn image_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::validation("invalid image ID"))
}

/// `POST /imgupl`
///
/// Multipart fields: `image` (file), `name`, `category_id`, `description`.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|err| AppError::validation(err.body_text()))?;

    let mut image: Option<(String, String, Bytes)> = None;
    let mut name = None;
    let mut category_id = None;
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                image = Some((file_name, content_type, data));
            }
            "name" => name = Some(field.text().await.map_err(multipart_error)?),
            "category_id" => {
                let raw = field.text().await.map_err(multipart_error)?;
                category_id = Some(parse_category_id(&raw)?);
            }
            "description" => description = field.text().await.map_err(multipart_error)?,
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let (file_name, content_type, data) =
        image.ok_or_else(|| AppError::validation("missing image file"))?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::validation("missing image name"))?;
    let category_id = category_id.ok_or_else(|| AppError::validation("missing category ID"))?;

    tracing::debug!(%file_name, %content_type, bytes = data.len(), "upload received");
    let asset = state
        .assets
        .create(
            NewAsset {
                name,
                category_id,
                description,
                file_name,
                content_type,
            },
            data,
        )
        .await?;

    Ok(Json(UploadResponse {
        id: asset.id,
        object_key: asset.object_key,
        message: "Image uploaded",
    }))
}

/// `GET /images`
pub async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<SignedListing>>, AppError> {
    Ok(Json(state.assets.list().await?))
}

/// `GET /image/{id}`
pub async fn get_image(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<SignedAsset>, AppError> {
    let id = image_id(path)?;
    Ok(Json(state.assets.get(id).await?))
}

/// `PUT /imgupd/{id}`
///
/// Accepts `multipart/form-data` or `application/x-www-form-urlencoded`
/// with any subset of `name`, `category_id` and `description`.
pub async fn update_image(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    request: Request,
) -> Result<Json<ImageAsset>, AppError> {
    let id = image_id(path)?;

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let form = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|err: MultipartRejection| AppError::validation(err.body_text()))?;
        let mut form = UpdateForm::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(field_name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field.text().await.map_err(multipart_error)?;
            form.set(&field_name, value);
        }
        form
    } else {
        let Form(form) = Form::<UpdateForm>::from_request(request, &state)
            .await
            .map_err(|err: FormRejection| AppError::validation(err.body_text()))?;
        form
    };

    let patch = form.into_patch()?;
    Ok(Json(state.assets.update(id, patch).await?))
}

/// `DELETE /imgdel/{id}`
pub async fn delete_image(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = image_id(path)?;
    state.assets.delete(id).await?;
    Ok(Json(DeleteResponse {
        message: "Image deleted successfully",
    }))
}
