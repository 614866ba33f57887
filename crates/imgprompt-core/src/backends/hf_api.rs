//! Hugging Face Inference API client for image-to-text models.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::RemoteCaptioner;
use crate::error::{Error, FailureKind, Result};

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Captions images through `POST {base}/models/{model_id}`.
#[derive(Clone)]
pub struct HfInferenceCaptioner {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HfInferenceCaptioner {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("imgprompt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!("{}/models/{}", self.base_url, model_id)
    }
}

#[async_trait]
impl RemoteCaptioner for HfInferenceCaptioner {
    async fn caption(&self, image: &[u8], model_id: &str) -> Result<String> {
        let url = self.endpoint(model_id);
        debug!("Remote caption request: {} ({} bytes)", url, image.len());

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::backend(FailureKind::Other, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::backend(FailureKind::Other, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error)
                .unwrap_or_else(|_| format!("HTTP {} from {}: {}", status, model_id, body.trim()));
            return Err(Error::backend(FailureKind::from_status(status.as_u16()), message));
        }

        parse_generated_text(&body)
    }
}

/// Extract `generated_text` from `[{"generated_text": ..}]` or `{"generated_text": ..}`.
fn parse_generated_text(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        Error::backend(FailureKind::Other, format!("Invalid response from inference API: {}", e))
    })?;

    let item = match &value {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(&value),
        _ => None,
    };

    Ok(item
        .and_then(|item| item.get("generated_text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}
