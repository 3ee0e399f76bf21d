//! HTTP error mapping.

use axum::Json;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use cinecache_core::{SourceId, SourceIdError, StorageError, TranscodeError};
use serde_json::json;
use tracing::error;

/// Failures surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(#[from] SourceIdError),

    #[error("Playback of {source_id} is not permitted")]
    Forbidden { source_id: SourceId },

    #[error("Film not found: {source_id}")]
    NotFound { source_id: SourceId },

    #[error("Range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebError {
    /// Status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            WebError::Forbidden { .. } => StatusCode::FORBIDDEN,
            WebError::NotFound { .. } => StatusCode::NOT_FOUND,
            WebError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            WebError::Transcode(TranscodeError::SourceMissing { .. }) => StatusCode::NOT_FOUND,
            WebError::Transcode(TranscodeError::EncodingFailed { .. })
            | WebError::Storage(_)
            | WebError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let WebError::RangeNotSatisfiable { size } = self {
            return Response::builder()
                .status(status)
                .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                .header(header::CONTENT_LENGTH, "0")
                .body(Body::empty())
                .unwrap_or_else(|_| status.into_response());
        }

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let message = match &self {
            WebError::Transcode(TranscodeError::EncodingFailed { .. }) => {
                "Transcode failed, reload to retry".to_string()
            }
            WebError::Storage(_) | WebError::Io(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
