use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::types::{ErrorBody, Mode};

/// Failures surfaced to callers of the gateway and the bot.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A mode string that names neither classifier.
    #[error("unsupported mode {0:?}, expected 'sentiment' or 'emotion'")]
    UnsupportedMode(String),

    /// Same as `UnsupportedMode`, raised while validating an incoming request.
    #[error("Mode должен быть 'sentiment' или 'emotion'")]
    InvalidMode(String),

    #[error("text must not be empty")]
    EmptyText,

    #[error("Invalid API Key")]
    Unauthorized,

    #[error("{mode} classifier is unavailable: {reason}")]
    ClassifierUnavailable { mode: Mode, reason: String },

    #[error("{mode} classification failed: {source:#}")]
    ClassificationFailed {
        mode: Mode,
        #[source]
        source: anyhow::Error,
    },
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::UnsupportedMode(_)
            | AnalysisError::InvalidMode(_)
            | AnalysisError::EmptyText => StatusCode::BAD_REQUEST,
            AnalysisError::Unauthorized => StatusCode::FORBIDDEN,
            AnalysisError::ClassifierUnavailable { .. }
            | AnalysisError::ClassificationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::UnsupportedMode(_) | AnalysisError::InvalidMode(_) => "invalid_mode",
            AnalysisError::EmptyText => "empty_text",
            AnalysisError::Unauthorized => "unauthorized",
            AnalysisError::ClassifierUnavailable { .. } => "classifier_unavailable",
            AnalysisError::ClassificationFailed { .. } => "classification_failed",
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            AnalysisError::InvalidMode("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AnalysisError::Unauthorized.status(), StatusCode::FORBIDDEN);
        let failed = AnalysisError::ClassificationFailed {
            mode: Mode::Emotion,
            source: anyhow::anyhow!("tensor shape mismatch"),
        };
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            failed.to_string(),
            "emotion classification failed: tensor shape mismatch"
        );
    }
}
