//! Configuration types for the imgprompt engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding locally cached model folders
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Token for the hosted inference API
    #[serde(default = "default_hf_api_key")]
    pub hf_api_key: Option<String>,

    /// Base URL of the hosted inference API
    #[serde(default = "default_hf_api_base_url")]
    pub hf_api_base_url: String,

    /// Hub URL local model files are fetched from
    #[serde(default = "default_hf_hub_url")]
    pub hf_hub_url: String,

    /// Allow the in-process captioning backend (when compiled in)
    #[serde(default = "default_local_backend")]
    pub local_backend: bool,

    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            hf_api_key: default_hf_api_key(),
            hf_api_base_url: default_hf_api_base_url(),
            hf_hub_url: default_hf_hub_url(),
            local_backend: default_local_backend(),
            progress: ProgressConfig::default(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_models_dir() -> PathBuf {
    if let Some(from_env) = non_empty_env("IMGPROMPT_MODELS_DIR") {
        return PathBuf::from(from_env);
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imgprompt")
        .join("models")
}

fn default_hf_api_key() -> Option<String> {
    non_empty_env("HUGGING_FACE_API_KEY")
}

fn default_hf_api_base_url() -> String {
    non_empty_env("IMGPROMPT_HF_API_URL")
        .unwrap_or_else(|| "https://api-inference.huggingface.co".to_string())
}

fn default_hf_hub_url() -> String {
    "https://huggingface.co".to_string()
}

fn default_local_backend() -> bool {
    non_empty_env("IMGPROMPT_LOCAL_BACKEND")
        .map(|raw| {
            let normalized = raw.to_ascii_lowercase();
            !matches!(normalized.as_str(), "0" | "false" | "no" | "off")
        })
        .unwrap_or(true)
}

/// Timing of the progress channel and of terminal-record reaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,

    #[serde(default = "default_ready_reap_ms")]
    pub ready_reap_ms: u64,

    #[serde(default = "default_error_reap_ms")]
    pub error_reap_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            close_grace_ms: default_close_grace_ms(),
            ready_reap_ms: default_ready_reap_ms(),
            error_reap_ms: default_error_reap_ms(),
        }
    }
}

impl ProgressConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn ready_reap(&self) -> Duration {
        Duration::from_millis(self.ready_reap_ms)
    }

    pub fn error_reap(&self) -> Duration {
        Duration::from_millis(self.error_reap_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_close_grace_ms() -> u64 {
    1000
}

fn default_ready_reap_ms() -> u64 {
    5000
}

fn default_error_reap_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_defaults_match_channel_contract() {
        let progress = ProgressConfig::default();
        assert_eq!(progress.poll_interval(), Duration::from_millis(500));
        assert_eq!(progress.close_grace(), Duration::from_secs(1));
        assert_eq!(progress.ready_reap(), Duration::from_secs(5));
        assert_eq!(progress.error_reap(), Duration::from_secs(10));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"models_dir": "/tmp/imgprompt-models"}"#).unwrap();
        assert_eq!(config.models_dir, PathBuf::from("/tmp/imgprompt-models"));
        assert_eq!(config.progress.poll_interval_ms, 500);
        assert_eq!(config.hf_hub_url, "https://huggingface.co");
    }
}
