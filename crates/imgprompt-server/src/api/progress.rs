//! Model load progress as Server-Sent Events

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub model: Option<String>,
}

/// Stream progress snapshots for a model key or local model id.
///
/// The stream ends shortly after a terminal status, or when the client goes away.
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let model = query
        .model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Model name required"))?;

    info!("Starting SSE progress stream for: {}", model);
    let stream = state
        .engine
        .subscribe_progress(&model)
        .map(|record| Event::default().json_data(record));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
