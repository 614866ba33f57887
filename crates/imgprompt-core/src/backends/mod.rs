//! Captioning backends.
//!
//! Dispatch talks to two capability seams: a hosted captioning API
//! ([`RemoteCaptioner`]) and an in-process pipeline loader ([`LocalCaptioner`]).
//! Whether the local side can run at all is decided once, when the engine is
//! built, and exposed through [`LocalCaptioner::is_available`].

#[cfg(feature = "blip")]
mod blip;
mod download;
mod hf_api;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

pub use download::ModelFetcher;
pub use hf_api::HfInferenceCaptioner;

#[cfg(feature = "blip")]
pub use blip::BlipCaptioner;

/// Phase reported by a local pipeline load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Downloading,
    Loading,
    Ready,
}

/// Progress event emitted while a local pipeline is fetched and loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEvent {
    pub status: LoadStatus,
    pub loaded: Option<u64>,
    pub total: Option<u64>,
    pub file: Option<String>,
}

impl LoadEvent {
    pub fn downloading(file: impl Into<String>, loaded: u64, total: Option<u64>) -> Self {
        Self {
            status: LoadStatus::Downloading,
            loaded: Some(loaded),
            total,
            file: Some(file.into()),
        }
    }

    pub fn loading() -> Self {
        Self {
            status: LoadStatus::Loading,
            loaded: None,
            total: None,
            file: None,
        }
    }

    pub fn ready() -> Self {
        Self {
            status: LoadStatus::Ready,
            loaded: None,
            total: None,
            file: None,
        }
    }

    /// Whole-number percentage for download events; 0 when the total is unknown.
    pub fn percent(&self) -> u8 {
        match (self.loaded, self.total) {
            (Some(loaded), Some(total)) if total > 0 => {
                ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
            }
            _ => 0,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(LoadEvent) + Send + Sync>;

/// A loaded captioning pipeline.
#[async_trait]
pub trait CaptionPipeline: Send + Sync {
    async fn caption(&self, image: &[u8]) -> Result<String>;
}

/// Loads in-process captioning pipelines.
#[async_trait]
pub trait LocalCaptioner: Send + Sync {
    fn is_available(&self) -> bool;

    /// Fetch (if needed) and instantiate the pipeline for `model_id`.
    async fn load(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn CaptionPipeline>>;
}

/// Hosted captioning API.
#[async_trait]
pub trait RemoteCaptioner: Send + Sync {
    async fn caption(&self, image: &[u8], model_id: &str) -> Result<String>;
}

/// Local capability for builds or configurations without an in-process backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLocalCaptioner;

#[async_trait]
impl LocalCaptioner for UnavailableLocalCaptioner {
    fn is_available(&self) -> bool {
        false
    }

    async fn load(
        &self,
        model_id: &str,
        _on_progress: ProgressCallback,
    ) -> Result<Arc<dyn CaptionPipeline>> {
        Err(Error::BackendUnavailable(format!(
            "local captioning is not available for {model_id}"
        )))
    }
}

/// Pick the local capability for this process.
pub fn local_captioner(config: &EngineConfig) -> Result<Arc<dyn LocalCaptioner>> {
    if !config.local_backend {
        info!("Local captioning disabled by configuration");
        return Ok(Arc::new(UnavailableLocalCaptioner));
    }

    #[cfg(feature = "blip")]
    {
        let fetcher = ModelFetcher::new(config.models_dir.clone(), config.hf_hub_url.clone())?;
        info!("Local captioning enabled (candle BLIP)");
        Ok(Arc::new(BlipCaptioner::new(fetcher)))
    }

    #[cfg(not(feature = "blip"))]
    {
        info!("Local captioning not compiled in; remote API only");
        Ok(Arc::new(UnavailableLocalCaptioner))
    }
}

pub fn remote_captioner(config: &EngineConfig) -> Result<Arc<dyn RemoteCaptioner>> {
    Ok(Arc::new(HfInferenceCaptioner::new(
        config.hf_api_base_url.clone(),
        config.hf_api_key.clone(),
    )?))
}
