use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures that stop a report before it reaches a handler.
///
/// Missing or mistyped report fields are never errors; only a body that
/// cannot be read or is not JSON at all ends up here.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds the configured limit")]
    BodyTooLarge,

    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl ReportError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReportError::BodyRead(_) | ReportError::MalformedJson(_) => StatusCode::BAD_REQUEST,
            ReportError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(%status, error = %self, "rejecting report");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
