//! imgprompt core - image captioning and prompt styling engine
//!
//! Turns an uploaded image into a text prompt for image-generation tools:
//! - a static model registry maps user-facing keys to backend model ids
//! - captions come from a hosted inference API or an in-process pipeline,
//!   with a single fallback hop to the other side on failure
//! - the caption is restyled to a requested detail level and length
//! - local pipeline loads report progress through a polled subscription
//!
//! # Example
//!
//! ```ignore
//! use imgprompt_core::{EngineConfig, GenerateRequest, LengthTarget, PromptEngine};
//!
//! let engine = PromptEngine::new(EngineConfig::default())?;
//! let request = GenerateRequest::new(image_bytes, "flux1")
//!     .with_length_target(LengthTarget::Long);
//! let prompt = engine.generate(request).await?;
//! println!("{} ({})", prompt.text, prompt.execution_mode);
//! ```

pub mod backends;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod progress;
pub mod runtime;
pub mod style;

pub use cache::{format_bytes, CacheListing, LocalCacheEntry, LocalCacheIndex};
pub use catalog::{ExecutionMode, ModelConfig, ModelRegistry, DEFAULT_MODEL_KEY, FLUX_MODEL_KEY};
pub use config::{EngineConfig, ProgressConfig};
pub use error::{Error, ErrorCategory, FailureKind, Result};
pub use progress::{ProgressRecord, ProgressStatus, ProgressTracker, ProgressUpdate};
pub use runtime::{
    GenerateRequest, GeneratedPrompt, ModelSummary, PreloadOutcome, PromptEngine,
    FALLBACK_CAPTION,
};
pub use style::{DetailLevel, FirstChoices, LengthTarget, PhraseChooser, RandomChooser};
