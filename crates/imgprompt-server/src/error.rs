//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imgprompt_core::{Error, ErrorCategory};
use serde_json::json;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Map a captioning failure to a stable, user-facing message.
    ///
    /// Request errors keep their own text; backend failures are reduced to
    /// one message per category.
    pub fn from_generation(err: Error) -> Self {
        let category = err.category();
        let status = status_for(category);
        let message = match category {
            ErrorCategory::InvalidRequest | ErrorCategory::Unavailable => err.to_string(),
            ErrorCategory::Auth => {
                "Hugging Face API key is missing or invalid. Please check your .env.local file."
                    .to_string()
            }
            ErrorCategory::RateLimit => "Rate limit exceeded. Please try again later.".to_string(),
            ErrorCategory::NotFound => {
                "Model not found or unavailable. Please try a different model.".to_string()
            }
            ErrorCategory::Generic => "Failed to generate prompt".to_string(),
        };
        Self::new(status, message)
    }
}

fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
        ErrorCategory::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Generic => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": match self.status {
                    StatusCode::BAD_REQUEST => "invalid_request_error",
                    StatusCode::UNAUTHORIZED => "authentication_error",
                    StatusCode::NOT_FOUND => "not_found_error",
                    StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
                    StatusCode::SERVICE_UNAVAILABLE => "unavailable_error",
                    _ => "server_error",
                },
                "code": self.status.as_str()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(status_for(err.category()), err.to_string())
    }
}
