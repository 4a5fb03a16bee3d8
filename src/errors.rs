// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Not configured: {0}")]
    Configuration(String),

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Unexpected model response: {0}")]
    ResponseShape(String),

    #[error("Malformed model payload: {0}")]
    MalformedPayload(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Image fetch error: {0}")]
    ImageFetch(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Unable to resolve a category: {0}")]
    Unresolved(String),
}

impl AnalyzerError {
    /// Failures worth another attempt when a caller owns a retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalyzerError::Transport(_)
                | AnalyzerError::Upstream { .. }
                | AnalyzerError::ResponseShape(_)
                | AnalyzerError::MalformedPayload(_)
        )
    }
}

impl ResponseError for AnalyzerError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalyzerError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalyzerError::Transport(_)
            | AnalyzerError::Upstream { .. }
            | AnalyzerError::ResponseShape(_) => StatusCode::BAD_GATEWAY,
            AnalyzerError::MalformedPayload(_)
            | AnalyzerError::Validation(_)
            | AnalyzerError::ImageFetch(_) => StatusCode::BAD_REQUEST,
            AnalyzerError::Unresolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalyzerError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let label = match self {
            AnalyzerError::Configuration(_) => "Service not configured",
            AnalyzerError::Transport(_)
            | AnalyzerError::Upstream { .. }
            | AnalyzerError::ResponseShape(_) => "AI service error",
            AnalyzerError::MalformedPayload(_) => "AI response error",
            AnalyzerError::Validation(_) => "Validation error",
            AnalyzerError::ImageFetch(_) => "Image fetch error",
            AnalyzerError::Catalog(_) => "Catalog error",
            AnalyzerError::Unresolved(_) => "Category unresolved",
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": label,
            "message": self.to_string()
        }))
    }
}
