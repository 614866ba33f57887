//! Prompt generation endpoints

use axum::{
    extract::{Multipart, State},
    Json,
};
use imgprompt_core::{
    DetailLevel, Error, ExecutionMode, GenerateRequest, LengthTarget, ModelSummary,
    DEFAULT_MODEL_KEY,
};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBody {
    pub prompt: String,
    pub confidence: Option<f32>,
    pub is_mock: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    pub original_name: Option<String>,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub model_used: String,
    pub execution_mode: ExecutionMode,
    pub model_description: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub prompt: PromptBody,
    pub model: String,
    pub metadata: PromptMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCacheInfo {
    pub cached_models: Vec<String>,
    pub cache_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<ModelSummary>,
    pub local_cache_info: LocalCacheInfo,
}

struct UploadedImage {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

/// List supported models and the currently loaded local pipelines
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let cached_models = state.engine.loaded_pipelines().await;
    Json(ModelsResponse {
        success: true,
        models: state.engine.list_models(),
        local_cache_info: LocalCacheInfo {
            cache_size: cached_models.len(),
            cached_models,
        },
    })
}

/// Caption an uploaded image and return the styled prompt
pub async fn generate_prompt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut image: Option<UploadedImage> = None;
    let mut model_key: Option<String> = None;
    let mut force_local = false;
    let mut length_target = LengthTarget::default();
    let mut detail_level = DetailLevel::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed reading multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| {
                ApiError::bad_request(format!("Failed reading multipart 'image' field: {e}"))
            })?;
            image = Some(UploadedImage {
                bytes: bytes.to_vec(),
                file_name,
                content_type,
            });
            continue;
        }

        let text = field.text().await.map_err(|e| {
            ApiError::bad_request(format!("Failed reading multipart '{name}' field: {e}"))
        })?;
        let value = text.trim();
        if value.is_empty() {
            continue;
        }

        match name.as_str() {
            "model" => model_key = Some(value.to_string()),
            "forceLocal" => force_local = value == "true",
            "promptLength" => length_target = value.parse()?,
            "detailLevel" => detail_level = value.parse()?,
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::from_generation(Error::MissingInput))?;
    let model_key = model_key.unwrap_or_else(|| DEFAULT_MODEL_KEY.to_string());
    info!(
        "Generating prompt with {} ({} bytes, length={}, detail={}, force_local={})",
        model_key,
        image.bytes.len(),
        length_target,
        detail_level,
        force_local
    );

    let size = image.bytes.len();
    let request = GenerateRequest::new(image.bytes, model_key)
        .with_force_local(force_local)
        .with_length_target(length_target)
        .with_detail_level(detail_level);
    let generated = state
        .engine
        .generate(request)
        .await
        .map_err(ApiError::from_generation)?;

    Ok(Json(GenerateResponse {
        success: true,
        prompt: PromptBody {
            prompt: generated.text,
            confidence: None,
            is_mock: false,
        },
        model: generated.model_key,
        metadata: PromptMetadata {
            original_name: image.file_name,
            size,
            content_type: image.content_type,
            model_used: generated.model_used,
            execution_mode: generated.execution_mode,
            model_description: generated.description,
        },
    }))
}
