//! Remote/local captioning dispatch with single-hop fallback.
//!
//! Every request picks a side from the model's registry entry and the local
//! capability, tries it once, and on failure tries the other side once if that
//! side is configured. When both fail the first error is the one reported.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backends::{
    CaptionPipeline, LoadEvent, LoadStatus, LocalCaptioner, ProgressCallback, RemoteCaptioner,
};
use crate::cache::LocalCacheIndex;
use crate::catalog::{ExecutionMode, ModelConfig, ModelRegistry};
use crate::error::{Error, Result};
use crate::progress::{ProgressStatus, ProgressTracker, ProgressUpdate};

/// Which side a request starts on, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub mode: ExecutionMode,
    pub reason: &'static str,
}

/// Caption text plus the side and model id that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
    pub execution_mode: ExecutionMode,
    pub model_id: String,
}

pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    remote: Arc<dyn RemoteCaptioner>,
    local: Arc<dyn LocalCaptioner>,
    local_available: bool,
    pipelines: RwLock<HashMap<String, Arc<dyn CaptionPipeline>>>,
    progress: Arc<ProgressTracker>,
    cache_index: LocalCacheIndex,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        remote: Arc<dyn RemoteCaptioner>,
        local: Arc<dyn LocalCaptioner>,
        progress: Arc<ProgressTracker>,
        cache_index: LocalCacheIndex,
    ) -> Self {
        let local_available = local.is_available();
        Self {
            registry,
            remote,
            local,
            local_available,
            pipelines: RwLock::new(HashMap::new()),
            progress,
            cache_index,
        }
    }

    /// Local capability as observed when the dispatcher was built.
    pub fn local_available(&self) -> bool {
        self.local_available
    }

    pub fn can_use_local(&self, config: &ModelConfig) -> bool {
        self.local_available && config.supports_local()
    }

    pub fn plan(&self, config: &ModelConfig, force_local: bool) -> DispatchPlan {
        if force_local {
            DispatchPlan {
                mode: ExecutionMode::Local,
                reason: "local execution was requested",
            }
        } else if config.prefer_local && self.can_use_local(config) {
            DispatchPlan {
                mode: ExecutionMode::Local,
                reason: "model prefers local execution and a local pipeline is available",
            }
        } else if config.prefer_local {
            DispatchPlan {
                mode: ExecutionMode::Api,
                reason: "model prefers local execution but no local pipeline is available",
            }
        } else {
            DispatchPlan {
                mode: ExecutionMode::Api,
                reason: "model runs through the hosted API by default",
            }
        }
    }

    /// Caption `image` with the model registered under `model_key`.
    pub async fn caption(&self, image: &[u8], model_key: &str, force_local: bool) -> Result<Caption> {
        let config = self.registry.lookup(model_key)?;
        let plan = self.plan(config, force_local);
        info!(
            "Selected {} captioning for {} ({})",
            plan.mode, model_key, plan.reason
        );

        let primary = match self.attempt(plan.mode, config, image).await {
            Ok(caption) => return Ok(caption),
            Err(err) => err,
        };

        let fallback_mode = plan.mode.other();
        let fallback_allowed = match fallback_mode {
            ExecutionMode::Api => config.supports_remote(),
            ExecutionMode::Local => self.can_use_local(config),
        };
        if !fallback_allowed {
            warn!("{} captioning failed for {}: {}", plan.mode, model_key, primary);
            return Err(primary);
        }

        warn!(
            "{} captioning failed for {}: {}; falling back to {}",
            plan.mode, model_key, primary, fallback_mode
        );
        match self.attempt(fallback_mode, config, image).await {
            Ok(caption) => Ok(caption),
            Err(fallback) => {
                warn!(
                    "{} fallback also failed for {}: {}",
                    fallback_mode, model_key, fallback
                );
                Err(Error::FallbackExhausted {
                    primary: Box::new(primary),
                    fallback: Box::new(fallback),
                })
            }
        }
    }

    async fn attempt(
        &self,
        mode: ExecutionMode,
        config: &ModelConfig,
        image: &[u8],
    ) -> Result<Caption> {
        let model_id = config.model_id(mode).ok_or_else(|| {
            Error::BackendUnavailable(format!("no {mode} model configured"))
        })?;

        let text = match mode {
            ExecutionMode::Api => self.remote.caption(image, model_id).await?,
            ExecutionMode::Local => self.load_pipeline(model_id).await?.caption(image).await?,
        };

        Ok(Caption {
            text,
            execution_mode: mode,
            model_id: model_id.to_string(),
        })
    }

    /// Return the cached pipeline for `model_id`, loading it on a miss.
    ///
    /// Progress for the load is recorded under `model_id`. Two callers that
    /// miss concurrently both load; the later insert replaces the earlier one.
    pub async fn load_pipeline(&self, model_id: &str) -> Result<Arc<dyn CaptionPipeline>> {
        if !self.local_available {
            self.progress.update(
                model_id,
                ProgressUpdate::status(ProgressStatus::Error)
                    .with_progress(0)
                    .with_message("Local captioning is not available"),
            );
            return Err(Error::BackendUnavailable(format!(
                "local captioning is not available for {model_id}"
            )));
        }

        let cached = self.pipelines.read().await.get(model_id).cloned();
        if let Some(pipeline) = cached {
            debug!("Pipeline cache hit for {}", model_id);
            self.progress.update(
                model_id,
                ProgressUpdate::status(ProgressStatus::Ready)
                    .with_progress(100)
                    .with_message("Model ready from cache"),
            );
            return Ok(pipeline);
        }

        debug!("Pipeline cache miss for {}", model_id);
        let initial = if self.cache_index.contains(model_id).await {
            ProgressUpdate::status(ProgressStatus::Loading)
                .with_progress(50)
                .with_message("Loading model from local cache...")
        } else {
            ProgressUpdate::status(ProgressStatus::Downloading)
                .with_progress(0)
                .with_message("Starting model download...")
        };
        self.progress.update(model_id, initial);

        let on_progress = progress_callback(self.progress.clone(), model_id);
        match self.local.load(model_id, on_progress).await {
            Ok(pipeline) => {
                self.pipelines
                    .write()
                    .await
                    .insert(model_id.to_string(), pipeline.clone());
                self.progress.update(
                    model_id,
                    ProgressUpdate::status(ProgressStatus::Ready)
                        .with_progress(100)
                        .with_message("Model loaded successfully"),
                );
                info!("Loaded local pipeline {}", model_id);
                Ok(pipeline)
            }
            Err(err) => {
                self.progress.update(
                    model_id,
                    ProgressUpdate::status(ProgressStatus::Error)
                        .with_progress(0)
                        .with_message(format!("Failed to load model: {err}")),
                );
                Err(err)
            }
        }
    }

    pub async fn is_loaded(&self, model_id: &str) -> bool {
        self.pipelines.read().await.contains_key(model_id)
    }

    /// Ids of every cached pipeline, sorted.
    pub async fn loaded_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn progress_callback(tracker: Arc<ProgressTracker>, model_id: &str) -> ProgressCallback {
    let key = model_id.to_string();
    Arc::new(move |event: LoadEvent| {
        let update = match event.status {
            LoadStatus::Downloading => ProgressUpdate::status(ProgressStatus::Downloading)
                .with_progress(event.percent())
                .with_message(format!(
                    "Downloading {}...",
                    event.file.as_deref().unwrap_or("model files")
                )),
            LoadStatus::Loading => ProgressUpdate::status(ProgressStatus::Loading)
                .with_progress(90)
                .with_message("Loading model into memory..."),
            LoadStatus::Ready => ProgressUpdate::status(ProgressStatus::Ready)
                .with_progress(100)
                .with_message("Model ready"),
        };
        tracker.update(&key, update);
    })
}
