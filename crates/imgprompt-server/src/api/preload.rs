//! Local pipeline preload endpoints

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use imgprompt_core::ErrorCategory;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreloadRequest {
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResponse {
    pub success: bool,
    pub message: String,
    pub model: String,
    pub local_model: String,
    pub already_loaded: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreloadQuery {
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedModelsResponse {
    pub success: bool,
    pub loaded_models: Vec<String>,
    pub cache_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadStatusResponse {
    pub success: bool,
    pub model: String,
    pub local_model: String,
    pub is_loaded: bool,
    pub description: String,
}

/// Load a model's local pipeline before its first caption request
pub async fn preload_model(
    State(state): State<AppState>,
    Json(req): Json<PreloadRequest>,
) -> Result<Json<PreloadResponse>, ApiError> {
    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Model parameter is required"))?;

    info!("Preloading model: {}", model);
    let outcome = state.engine.preload(&model).await.map_err(|err| {
        match err.category() {
            ErrorCategory::InvalidRequest | ErrorCategory::Unavailable => ApiError::from(err),
            _ => {
                warn!("Preload of {} failed: {}", model, err);
                ApiError::internal(format!("Failed to preload model: {err}"))
            }
        }
    })?;

    Ok(Json(PreloadResponse {
        success: true,
        message: if outcome.already_loaded {
            "Model was already loaded".to_string()
        } else {
            "Model preloaded successfully".to_string()
        },
        model: outcome.model_key,
        local_model: outcome.model_id,
        already_loaded: outcome.already_loaded,
    }))
}

/// Without `model`: every loaded pipeline. With `model`: whether its pipeline is loaded.
pub async fn preload_status(
    State(state): State<AppState>,
    Query(query): Query<PreloadQuery>,
) -> Result<Response, ApiError> {
    let Some(model) = query.model.filter(|m| !m.trim().is_empty()) else {
        let loaded_models = state.engine.loaded_pipelines().await;
        let body = LoadedModelsResponse {
            success: true,
            cache_size: loaded_models.len(),
            loaded_models,
        };
        return Ok(Json(body).into_response());
    };

    let (local_model, description) = state
        .engine
        .registry()
        .get(&model)
        .and_then(|config| {
            config
                .local_model_id
                .clone()
                .map(|id| (id, config.description.clone()))
        })
        .ok_or_else(|| {
            ApiError::bad_request(format!("Model '{}' does not support local loading", model))
        })?;

    let body = PreloadStatusResponse {
        success: true,
        is_loaded: state.engine.is_preloaded(&model).await?,
        model,
        local_model,
        description,
    };
    Ok(Json(body).into_response())
}
