//! Runtime request/response types.

use serde::Serialize;

use crate::catalog::{ExecutionMode, ModelConfig};
use crate::style::{DetailLevel, LengthTarget};

/// One prompt-generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub image: Vec<u8>,
    pub model_key: String,
    pub force_local: bool,
    /// `None` leaves the caption length untouched.
    pub length_target: Option<LengthTarget>,
    pub detail_level: DetailLevel,
}

impl GenerateRequest {
    pub fn new(image: impl Into<Vec<u8>>, model_key: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            model_key: model_key.into(),
            force_local: false,
            length_target: None,
            detail_level: DetailLevel::default(),
        }
    }

    pub fn with_force_local(mut self, force_local: bool) -> Self {
        self.force_local = force_local;
        self
    }

    pub fn with_length_target(mut self, length_target: LengthTarget) -> Self {
        self.length_target = Some(length_target);
        self
    }

    pub fn with_detail_level(mut self, detail_level: DetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPrompt {
    pub text: String,
    pub execution_mode: ExecutionMode,
    pub model_key: String,
    /// Backend model id that produced the caption
    pub model_used: String,
    pub description: String,
}

/// Catalog row as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub key: String,
    pub description: String,
    pub supports_local: bool,
    pub supports_api: bool,
    pub default_mode: ExecutionMode,
    pub local_model: Option<String>,
    pub api_model: String,
}

impl ModelSummary {
    pub fn new(key: &str, config: &ModelConfig) -> Self {
        Self {
            key: key.to_string(),
            description: config.description.clone(),
            supports_local: config.supports_local(),
            supports_api: config.supports_remote(),
            default_mode: config.default_mode(),
            local_model: config.local_model_id.clone(),
            api_model: config.remote_model_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadOutcome {
    pub model_key: String,
    pub model_id: String,
    pub already_loaded: bool,
}
