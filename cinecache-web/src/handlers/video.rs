//! Range-aware video delivery.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;

use super::FilenameQuery;
use crate::error::WebError;
use crate::server::AppState;

/// `GET /video?filename=<id>`
///
/// Waits for the artifact (joining any in-flight transcode) and streams it.
///
/// # Errors
/// - `WebError::Transcode` - Source missing (404) or transcode failed (500)
/// - `WebError::RangeNotSatisfiable` - Range starts past the end (416)
pub async fn stream_video(
    State(state): State<AppState>,
    Query(query): Query<FilenameQuery>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let id = state.authorize(&query.filename).await?;
    let path = state.coordinator.ensure_ready(&id).await?;

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    state.streamer.serve(&path, range).await
}
