//! Local model cache endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use imgprompt_core::CacheListing;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LocalModelsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub listing: CacheListing,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_path: PathBuf,
}

/// List cached model folders
pub async fn list_local_models(
    State(state): State<AppState>,
) -> Result<Json<LocalModelsResponse>, ApiError> {
    let listing = state.engine.list_local_models().await?;
    let message = format!("Found {} local models", listing.models.len());
    Ok(Json(LocalModelsResponse {
        success: true,
        listing,
        message,
    }))
}

/// Remove a cached model folder
pub async fn delete_local_model(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let model = query
        .model
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Model name is required"))?;

    info!("Deleting local model: {}", model);
    let deleted_path = state.engine.delete_local_model(&model).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Model '{}' removed successfully", model),
        deleted_path,
    }))
}
