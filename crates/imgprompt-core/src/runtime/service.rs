//! Prompt engine service object.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use tracing::info;

use crate::backends::{self, LocalCaptioner, RemoteCaptioner};
use crate::cache::{CacheListing, LocalCacheIndex};
use crate::catalog::ModelRegistry;
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::progress::{ProgressRecord, ProgressTracker};
use crate::runtime::types::{GenerateRequest, GeneratedPrompt, ModelSummary, PreloadOutcome};
use crate::style::{PhraseChooser, RandomChooser, StyleRequest};

/// Caption substituted when a backend returns blank text.
pub const FALLBACK_CAPTION: &str = "A beautiful image";

/// Owns every piece of process state behind the prompt generator.
pub struct PromptEngine {
    config: EngineConfig,
    registry: Arc<ModelRegistry>,
    progress: Arc<ProgressTracker>,
    cache_index: LocalCacheIndex,
    dispatcher: Dispatcher,
    chooser: Mutex<Box<dyn PhraseChooser + Send>>,
}

impl PromptEngine {
    /// Build the engine with the configured backends.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let local = backends::local_captioner(&config)?;
        let remote = backends::remote_captioner(&config)?;
        Ok(Self::with_backends(
            config,
            ModelRegistry::builtin(),
            remote,
            local,
        ))
    }

    pub fn with_backends(
        config: EngineConfig,
        registry: ModelRegistry,
        remote: Arc<dyn RemoteCaptioner>,
        local: Arc<dyn LocalCaptioner>,
    ) -> Self {
        let registry = Arc::new(registry);
        let progress = Arc::new(ProgressTracker::new(config.progress.clone()));
        let cache_index = LocalCacheIndex::new(config.models_dir.clone());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            remote,
            local,
            progress.clone(),
            cache_index.clone(),
        );

        info!(
            "Prompt engine ready: {} models, local captioning {}, cache at {:?}",
            registry.len(),
            if dispatcher.local_available() {
                "available"
            } else {
                "unavailable"
            },
            config.models_dir
        );

        Self {
            config,
            registry,
            progress,
            cache_index,
            dispatcher,
            chooser: Mutex::new(Box::new(RandomChooser::from_entropy())),
        }
    }

    /// Replace the random phrase source.
    pub fn with_chooser(mut self, chooser: impl PhraseChooser + Send + 'static) -> Self {
        self.chooser = Mutex::new(Box::new(chooser));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn cache_index(&self) -> &LocalCacheIndex {
        &self.cache_index
    }

    pub fn local_available(&self) -> bool {
        self.dispatcher.local_available()
    }

    /// Caption an image and style the caption into a prompt.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GeneratedPrompt> {
        if request.image.is_empty() {
            return Err(Error::MissingInput);
        }

        let description = self.registry.lookup(&request.model_key)?.description.clone();
        let caption = self
            .dispatcher
            .caption(&request.image, &request.model_key, request.force_local)
            .await?;

        let raw_text = if caption.text.trim().is_empty() {
            FALLBACK_CAPTION.to_string()
        } else {
            caption.text
        };

        let style = StyleRequest {
            raw_text,
            length_target: request.length_target,
            detail_level: request.detail_level,
            model_key: request.model_key.clone(),
        };
        let text = {
            let mut chooser = self.chooser.lock().unwrap_or_else(PoisonError::into_inner);
            style.render(&mut **chooser)
        };

        Ok(GeneratedPrompt {
            text,
            execution_mode: caption.execution_mode,
            model_key: request.model_key,
            model_used: caption.model_id,
            description,
        })
    }

    /// Every registered model, in registration order.
    pub fn list_models(&self) -> Vec<ModelSummary> {
        self.registry
            .list()
            .map(|(key, config)| ModelSummary::new(key, config))
            .collect()
    }

    /// Local model ids with an instantiated pipeline.
    pub async fn loaded_pipelines(&self) -> Vec<String> {
        self.dispatcher.loaded_models().await
    }

    /// Load the local pipeline behind `model_key` ahead of its first use.
    pub async fn preload(&self, model_key: &str) -> Result<PreloadOutcome> {
        let config = self.registry.lookup(model_key)?;
        let model_id = config.local_model_id.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "Model {model_key} does not support local preloading"
            ))
        })?;

        let already_loaded = self.dispatcher.is_loaded(model_id).await;
        self.dispatcher.load_pipeline(model_id).await?;
        info!("Preloaded {} ({})", model_key, model_id);

        Ok(PreloadOutcome {
            model_key: model_key.to_string(),
            model_id: model_id.to_string(),
            already_loaded,
        })
    }

    pub async fn is_preloaded(&self, model_key: &str) -> Result<bool> {
        let config = self.registry.lookup(model_key)?;
        Ok(match config.local_model_id.as_deref() {
            Some(model_id) => self.dispatcher.is_loaded(model_id).await,
            None => false,
        })
    }

    /// Progress records are keyed by local model id; accept a registry key too.
    pub fn progress_key(&self, key_or_id: &str) -> String {
        self.registry
            .get(key_or_id)
            .and_then(|config| config.local_model_id.clone())
            .unwrap_or_else(|| key_or_id.to_string())
    }

    pub fn subscribe_progress(
        &self,
        key_or_id: &str,
    ) -> impl Stream<Item = ProgressRecord> + Send + 'static {
        self.progress.subscribe(&self.progress_key(key_or_id))
    }

    pub async fn list_local_models(&self) -> Result<CacheListing> {
        let index = self.cache_index.clone();
        tokio::task::spawn_blocking(move || index.list())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    pub async fn delete_local_model(&self, model_name: &str) -> Result<PathBuf> {
        let index = self.cache_index.clone();
        let name = model_name.to_string();
        tokio::task::spawn_blocking(move || index.delete(&name))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Stop progress reapers and close open progress subscriptions.
    pub fn shutdown(&self) {
        info!("Shutting down prompt engine");
        self.progress.shutdown();
    }
}
