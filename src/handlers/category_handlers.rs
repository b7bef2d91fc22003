use crate::{errors::AppError, models::category::Category, state::AppState};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use garde::Validate;
use serde::Deserialize;

#[derive(Debug, Deserialize, Validate)]
pub struct NewCategoryRequest {
    #[garde(length(min = 1, max = 128))]
    pub name: String,
}

/// `GET /categories`
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = state.assets.metadata().list_categories().await?;
    Ok(Json(categories))
}

/// `POST /categories`
pub async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<NewCategoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(mut payload) = payload?;
    payload.name = payload.name.trim().to_string();
    payload.validate()?;

    let category = state
        .assets
        .metadata()
        .insert_category(&payload.name)
        .await?;
    tracing::info!(id = category.id, name = %category.name, "category added");
    Ok((StatusCode::CREATED, Json(category)))
}
