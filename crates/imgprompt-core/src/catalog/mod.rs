//! Model catalog: the static mapping from a user-facing model key to the
//! identifiers used by each captioning backend.
//!
//! The registry is built once at startup and never mutated. Iteration order is
//! registration order, which is also the order models are presented to users.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Key of the variant whose output gets the Flux quality post-pass.
pub const FLUX_MODEL_KEY: &str = "flux1";

/// Model key used when a request does not name one.
pub const DEFAULT_MODEL_KEY: &str = "vit";

const BLIP_LARGE: &str = "Salesforce/blip-image-captioning-large";
const VIT_GPT2: &str = "nlpconnect/vit-gpt2-image-captioning";

/// Where a caption was (or will be) produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Hosted inference API
    Api,
    /// In-process pipeline
    Local,
}

impl ExecutionMode {
    pub fn other(self) -> Self {
        match self {
            Self::Api => Self::Local,
            Self::Local => Self::Api,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => f.write_str("api"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Execution metadata for one model key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub remote_model_id: String,
    pub local_model_id: Option<String>,
    pub prefer_local: bool,
    pub description: String,
}

impl ModelConfig {
    pub fn new(
        remote_model_id: impl Into<String>,
        local_model_id: Option<&str>,
        prefer_local: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            remote_model_id: remote_model_id.into(),
            local_model_id: local_model_id.map(str::to_string),
            prefer_local,
            description: description.into(),
        }
    }

    pub fn supports_remote(&self) -> bool {
        !self.remote_model_id.trim().is_empty()
    }

    pub fn supports_local(&self) -> bool {
        self.local_model_id.is_some()
    }

    pub fn default_mode(&self) -> ExecutionMode {
        if self.prefer_local {
            ExecutionMode::Local
        } else {
            ExecutionMode::Api
        }
    }

    /// Identifier handed to the backend for `mode`, if that side is configured.
    pub fn model_id(&self, mode: ExecutionMode) -> Option<&str> {
        match mode {
            ExecutionMode::Api => self
                .supports_remote()
                .then_some(self.remote_model_id.as_str()),
            ExecutionMode::Local => self.local_model_id.as_deref(),
        }
    }
}

/// Immutable, ordered registry of supported model keys.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<(String, ModelConfig)>,
}

impl ModelRegistry {
    /// Build a registry from `(key, config)` pairs, rejecting duplicate keys.
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, ModelConfig)>) -> Result<Self> {
        let mut collected: Vec<(String, ModelConfig)> = Vec::new();
        for (key, config) in entries {
            let key = key.into();
            if key.trim().is_empty() {
                return Err(Error::Config("model key must not be empty".to_string()));
            }
            if collected.iter().any(|(existing, _)| *existing == key) {
                return Err(Error::Config(format!("duplicate model key: {key}")));
            }
            collected.push((key, config));
        }
        Ok(Self { entries: collected })
    }

    /// The models shipped with imgprompt.
    pub fn builtin() -> Self {
        let entries = vec![
            (
                "vit",
                ModelConfig::new(
                    VIT_GPT2,
                    Some(BLIP_LARGE),
                    true,
                    "ViT-GPT2 captioning (fastest local model)",
                ),
            ),
            (
                "blip",
                ModelConfig::new(
                    "Salesforce/blip-image-captioning-base",
                    Some(BLIP_LARGE),
                    true,
                    "BLIP image captioning",
                ),
            ),
            (
                "blip-large",
                ModelConfig::new(
                    BLIP_LARGE,
                    Some(BLIP_LARGE),
                    true,
                    "BLIP Large model (high quality)",
                ),
            ),
            (
                "blip-longcap",
                ModelConfig::new(
                    "unography/blip-long-cap",
                    Some(BLIP_LARGE),
                    true,
                    "BLIP Long Caption (detailed descriptions)",
                ),
            ),
            (
                "git-base",
                ModelConfig::new(
                    "microsoft/git-base",
                    Some(BLIP_LARGE),
                    true,
                    "Microsoft GIT model (high quality)",
                ),
            ),
            (
                "glm-4.5",
                ModelConfig::new(VIT_GPT2, None, false, "GLM-4.5 via API only"),
            ),
            (
                FLUX_MODEL_KEY,
                ModelConfig::new(VIT_GPT2, Some(BLIP_LARGE), true, "Flux1-optimized prompts"),
            ),
            (
                "midjourney",
                ModelConfig::new(VIT_GPT2, Some(BLIP_LARGE), true, "Midjourney-style prompts"),
            ),
            (
                "dalle3",
                ModelConfig::new(VIT_GPT2, Some(BLIP_LARGE), true, "DALL-E 3 style prompts"),
            ),
            (
                "stable-diffusion",
                ModelConfig::new(VIT_GPT2, Some(BLIP_LARGE), true, "Stable Diffusion prompts"),
            ),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|(key, config)| (key.to_string(), config))
                .collect(),
        }
    }

    /// Resolve a model key, failing with a message that lists the valid keys.
    pub fn lookup(&self, key: &str) -> Result<&ModelConfig> {
        self.get(key).ok_or_else(|| Error::InvalidModel {
            key: if key.trim().is_empty() {
                "<empty>".to_string()
            } else {
                key.to_string()
            },
            available: self.keys().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn get(&self, key: &str) -> Option<&ModelConfig> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, config)| config)
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &ModelConfig)> {
        self.entries
            .iter()
            .map(|(key, config)| (key.as_str(), config))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// True when `model_key` selects the Flux-flavoured prompt post-pass.
pub fn is_flux_style(model_key: &str) -> bool {
    model_key == FLUX_MODEL_KEY
}
