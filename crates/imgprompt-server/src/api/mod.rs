//! API routes and handlers

mod health;
mod local_models;
mod preload;
mod progress;
mod prompt;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Create the main API router
pub fn create_router(state: AppState, ui_dir: Option<PathBuf>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Prompt generation
        .route(
            "/generate-prompt",
            get(prompt::list_models).post(prompt::generate_prompt),
        )
        // Load progress (SSE)
        .route("/model-progress", get(progress::progress_stream))
        // Local model cache
        .route(
            "/local-models",
            get(local_models::list_local_models).delete(local_models::delete_local_model),
        )
        .route(
            "/preload-model",
            get(preload::preload_status).post(preload::preload_model),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let mut router = Router::new().nest("/api", api_routes);

    // Serve static files for UI
    if let Some(dir) = ui_dir {
        let index = dir.join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use imgprompt_core::backends::{RemoteCaptioner, UnavailableLocalCaptioner};
    use imgprompt_core::{EngineConfig, FirstChoices, ModelRegistry, PromptEngine};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "imgprompt-test-boundary";

    struct StaticRemote(&'static str);

    #[async_trait]
    impl RemoteCaptioner for StaticRemote {
        async fn caption(&self, _image: &[u8], _model_id: &str) -> imgprompt_core::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn app() -> (Router, PathBuf) {
        let models_dir = std::env::temp_dir().join(format!("imgprompt-api-{}", Uuid::new_v4()));
        let config = EngineConfig {
            models_dir: models_dir.clone(),
            ..EngineConfig::default()
        };
        let engine = PromptEngine::with_backends(
            config,
            ModelRegistry::builtin(),
            Arc::new(StaticRemote("a dog running in a field")),
            Arc::new(UnavailableLocalCaptioner),
        )
        .with_chooser(FirstChoices);
        (create_router(AppState::new(engine), None), models_dir)
    }

    fn multipart_body(image: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"dog.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn generate_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/generate-prompt")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_local_capability() {
        let (app, _) = app();
        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["localAvailable"], false);
    }

    #[tokio::test]
    async fn lists_models_with_cache_info() {
        let (app, _) = app();
        let response = app.oneshot(get("/api/generate-prompt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["models"].as_array().unwrap().len(), 10);
        assert_eq!(body["models"][0]["key"], "vit");
        assert_eq!(body["models"][0]["defaultMode"], "local");
        assert_eq!(body["models"][5]["supportsLocal"], false);
        assert_eq!(body["localCacheInfo"]["cacheSize"], 0);
    }

    #[tokio::test]
    async fn generates_prompt_from_upload() {
        let (app, _) = app();
        let body = multipart_body(
            Some(b"\x89PNG fake"),
            &[
                ("model", "vit"),
                ("promptLength", "short"),
                ("detailLevel", "minimal"),
            ],
        );
        let response = app.oneshot(generate_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["prompt"]["prompt"], "a dog running in a field");
        assert_eq!(body["prompt"]["isMock"], false);
        assert_eq!(body["model"], "vit");
        assert_eq!(body["metadata"]["originalName"], "dog.png");
        assert_eq!(body["metadata"]["type"], "image/png");
        assert_eq!(body["metadata"]["executionMode"], "api");
        assert_eq!(
            body["metadata"]["modelUsed"],
            "nlpconnect/vit-gpt2-image-captioning"
        );
    }

    #[tokio::test]
    async fn missing_image_is_bad_request() {
        let (app, _) = app();
        let response = app
            .oneshot(generate_request(multipart_body(None, &[("model", "vit")])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "No image provided");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn unknown_model_lists_available_keys() {
        let (app, _) = app();
        let body = multipart_body(Some(b"img"), &[("model", "sdxl")]);
        let response = app.oneshot(generate_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Invalid model: sdxl. Available models: vit, blip"));
    }

    #[tokio::test]
    async fn unknown_length_target_is_rejected() {
        let (app, _) = app();
        let body = multipart_body(Some(b"img"), &[("promptLength", "epic")]);
        let response = app.oneshot(generate_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn progress_stream_requires_model() {
        let (app, _) = app();
        let response = app.oneshot(get("/api/model-progress")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn progress_stream_is_event_stream() {
        let (app, _) = app();
        let response = app.oneshot(get("/api/model-progress?model=vit")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
    }

    #[tokio::test]
    async fn local_models_listing_and_delete() {
        let (app, models_dir) = app();
        std::fs::create_dir_all(models_dir.join("owner_model")).unwrap();
        std::fs::write(models_dir.join("owner_model").join("config.json"), b"{}").unwrap();

        let response = app.clone().oneshot(get("/api/local-models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["models"][0]["name"], "owner/model");
        assert_eq!(body["totalSize"], 2);
        assert_eq!(body["message"], "Found 1 local models");

        let delete = |uri: &str| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(delete("/api/local-models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(delete("/api/local-models?model=owner/model"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!models_dir.join("owner_model").exists());

        let response = app
            .oneshot(delete("/api/local-models?model=owner/model"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = std::fs::remove_dir_all(&models_dir);
    }

    #[tokio::test]
    async fn preload_validation_and_status() {
        let (app, _) = app();
        let post = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/preload-model")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(post("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(post(r#"{"model":"glm-4.5"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(post(r#"{"model":"vit"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app.clone().oneshot(get("/api/preload-model")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["loadedModels"].as_array().unwrap().len(), 0);

        let response = app.oneshot(get("/api/preload-model?model=blip")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["isLoaded"], false);
        assert_eq!(body["localModel"], "Salesforce/blip-image-captioning-large");
    }
}
