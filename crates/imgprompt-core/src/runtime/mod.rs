//! Runtime orchestration layer.
//!
//! [`PromptEngine`] owns the registry, the captioning backends, the pipeline
//! cache and the progress table. Request handlers receive it by reference
//! instead of reaching for process-wide state.

mod service;
mod types;

pub use service::{PromptEngine, FALLBACK_CAPTION};
pub use types::{GenerateRequest, GeneratedPrompt, ModelSummary, PreloadOutcome};
