//! Whole-file downloads.

use axum::extract::{Query, State};
use axum::response::Response;
use tracing::debug;

use super::FilenameQuery;
use crate::error::WebError;
use crate::server::AppState;

/// `GET /download?filename=<id>`
///
/// Serves the artifact when present, otherwise the untouched source. Never
/// starts a transcode.
///
/// # Errors
/// - `WebError::NotFound` - Neither artifact nor source exists
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Response, WebError> {
    let id = state.authorize(&query.filename).await?;

    let path = match state.store.find_ready(&id).await {
        Some(path) => path,
        None => state
            .store
            .find_source(&id)
            .await
            .ok_or_else(|| WebError::NotFound {
                source_id: id.clone(),
            })?,
    };
    debug!("Download of {} from {}", id, path.display());

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string());
    state.streamer.serve_attachment(&path, &filename).await
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use cinecache_core::transcoding::testing::ScriptedEncoder;

    use crate::handlers::test_support::{TestServer, body_bytes};

    #[tokio::test]
    async fn test_prefers_artifact_over_source() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        server.add_source("movie.mkv", b"original").await;
        server.add_artifact("movie.mkv", b"transcoded").await;

        let response = server.get("/download?filename=movie.mkv", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("movie.mkv.mp4"));
        assert_eq!(body_bytes(response).await, b"transcoded");
    }

    #[tokio::test]
    async fn test_falls_back_to_source_without_transcoding() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let id = server.add_source("movie.mkv", b"original").await;

        let response = server.get("/download?filename=movie.mkv", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"original");
        assert!(!server.state.coordinator.is_running(&id));
    }

    #[tokio::test]
    async fn test_missing_is_404() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let response = server.get("/download?filename=ghost.mkv", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
