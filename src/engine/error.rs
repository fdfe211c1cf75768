use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "Internal server error during code execution";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("Unsupported language: {language}. Supported languages: {}", supported.join(", "))]
    UnsupportedLanguage {
        language: String,
        supported: Vec<String>,
    },
    #[error("failed to provision workspace: {0}")]
    Provision(#[source] std::io::Error),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("execution capacity exhausted")]
    Overloaded,
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::UnsupportedLanguage { .. } => "validation_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Provision(_) => "provision_error",
            Self::Overloaded => "overloaded",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsupportedLanguage { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provision(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Environment failures never expose their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Provision(_) | Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            Self::Overloaded => "Too many executions in progress, retry later".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "execution request failed");
        }
        let body = Json(ErrorBody {
            error: self.public_message(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(value.to_string())
    }
}
