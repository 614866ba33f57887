//! Application state

use imgprompt_core::PromptEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PromptEngine>,
}

impl AppState {
    pub fn new(engine: PromptEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
