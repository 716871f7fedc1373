//! HTTP error mapping. Every failure is rendered as `{"error": "..."}`.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use churn_core::IngestError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Ingest(err) if err.is_bad_input() => StatusCode::BAD_REQUEST,
            ApiError::Ingest(
                IngestError::UnknownUpload(_)
                | IngestError::StaleUpload(_)
                | IngestError::NotFound(_),
            ) => StatusCode::NOT_FOUND,
            ApiError::Ingest(IngestError::Gateway(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Ingest(_) | ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use providers::ProviderError;

    #[test]
    fn ingest_errors_map_to_statuses() {
        let cases = [
            (IngestError::MissingFile, StatusCode::BAD_REQUEST),
            (IngestError::Structure("x".into()), StatusCode::BAD_REQUEST),
            (IngestError::UnknownUpload("u".into()), StatusCode::NOT_FOUND),
            (IngestError::StaleUpload("u".into()), StatusCode::NOT_FOUND),
            (IngestError::Archive("clash".into()), StatusCode::BAD_REQUEST),
            (
                IngestError::Gateway(ProviderError::Timeout(std::time::Duration::from_secs(1))),
                StatusCode::BAD_GATEWAY,
            ),
            (IngestError::Task("panicked".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
