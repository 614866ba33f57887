//! Error types for imgprompt-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse reason attached to a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    RateLimit,
    NotFound,
    Other,
}

impl FailureKind {
    /// Map an HTTP status returned by a hosted inference API.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            404 => Self::NotFound,
            _ => Self::Other,
        }
    }
}

/// User-facing category used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Auth,
    RateLimit,
    NotFound,
    Unavailable,
    Generic,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid model: {key}. Available models: {available}")]
    InvalidModel { key: String, available: String },

    #[error("No image provided")]
    MissingInput,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Captioning backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{message}")]
    BackendFailure { kind: FailureKind, message: String },

    /// Both the chosen side and its fallback failed. Displays as the primary error.
    #[error("{primary}")]
    FallbackExhausted {
        primary: Box<Error>,
        fallback: Box<Error>,
    },

    #[error("Model '{0}' not found locally")]
    LocalModelNotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn backend(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            kind,
            message: message.into(),
        }
    }

    /// The error a caller should see: the primary one when a fallback was also exhausted.
    pub fn surfaced(&self) -> &Error {
        match self {
            Self::FallbackExhausted { primary, .. } => primary.surfaced(),
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.surfaced() {
            Self::InvalidModel { .. } | Self::MissingInput | Self::InvalidInput(_) => {
                ErrorCategory::InvalidRequest
            }
            Self::LocalModelNotFound(_) => ErrorCategory::NotFound,
            Self::BackendUnavailable(_) => ErrorCategory::Unavailable,
            Self::BackendFailure { kind, message } => match kind {
                FailureKind::Auth => ErrorCategory::Auth,
                FailureKind::RateLimit => ErrorCategory::RateLimit,
                FailureKind::NotFound => ErrorCategory::NotFound,
                FailureKind::Other => classify_message(message),
            },
            other => classify_message(&other.to_string()),
        }
    }
}

/// Message-based classification for failures that carry no structured kind.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("api key") {
        ErrorCategory::Auth
    } else if lowered.contains("rate limit") {
        ErrorCategory::RateLimit
    } else if lowered.contains("model") {
        ErrorCategory::NotFound
    } else {
        ErrorCategory::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_exhausted_surfaces_primary() {
        let err = Error::FallbackExhausted {
            primary: Box::new(Error::backend(FailureKind::RateLimit, "too many requests")),
            fallback: Box::new(Error::ModelLoad("weights missing".into())),
        };
        assert_eq!(err.to_string(), "too many requests");
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert!(matches!(err.surfaced(), Error::BackendFailure { .. }));
    }

    #[test]
    fn structured_kind_wins_over_message() {
        let err = Error::backend(FailureKind::Auth, "model is loading");
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn unstructured_messages_are_classified() {
        assert_eq!(classify_message("Invalid API key"), ErrorCategory::Auth);
        assert_eq!(
            classify_message("Rate limit reached for requests"),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify_message("Model xyz does not exist"),
            ErrorCategory::NotFound
        );
        assert_eq!(classify_message("connection reset"), ErrorCategory::Generic);
    }

    #[test]
    fn user_errors_are_invalid_requests() {
        assert_eq!(Error::MissingInput.category(), ErrorCategory::InvalidRequest);
        let err = Error::InvalidModel {
            key: "nope".into(),
            available: "vit".into(),
        };
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
    }
}
