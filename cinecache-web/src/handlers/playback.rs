//! Playback entry point: reports readiness and kicks off transcodes.

use axum::Json;
use axum::extract::{Query, State};
use cinecache_core::SourceId;
use cinecache_core::transcoding::RunAttachment;
use serde_json::{Value, json};
use tracing::debug;

use super::FilenameQuery;
use crate::error::WebError;
use crate::server::AppState;

/// `GET /filmes?filename=<id>`
///
/// Returns playback URLs once the artifact exists. Otherwise starts (or joins)
/// the transcode in the background and returns the current progress so the
/// page can poll `/progress`.
///
/// # Errors
/// - `WebError::InvalidFilename` / `WebError::Forbidden` - Rejected request
/// - `WebError::Transcode` - Neither artifact nor source exists (404)
pub async fn playback_entry(
    State(state): State<AppState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Json<Value>, WebError> {
    let id = state.authorize(&query.filename).await?;

    match state.coordinator.start_background(&id).await? {
        RunAttachment::Ready(_) => Ok(Json(ready_body(&id))),
        RunAttachment::Running(_) => {
            let report = state.tracker.report(&id);
            debug!("{} in progress at {:.1}%", id, report.percent);
            Ok(Json(json!({
                "status": "in_progress",
                "percent": report.percent,
                "eta": report.eta,
            })))
        }
    }
}

fn ready_body(id: &SourceId) -> Value {
    let encoded = urlencoding::encode(id.as_str());
    json!({
        "status": "ready",
        "title": id.display_title(),
        "video_url": format!("/video?filename={encoded}"),
        "download_url": format!("/download?filename={encoded}"),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use cinecache_core::SourceId;
    use cinecache_core::transcoding::testing::ScriptedEncoder;

    use crate::handlers::test_support::{DenyPrivate, TestServer, body_json};

    #[tokio::test]
    async fn test_ready_artifact() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        server.add_artifact("Night of the Hunter.mkv", b"mp4").await;

        let response = server
            .get("/filmes?filename=Night%20of%20the%20Hunter.mkv", None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ready");
        assert_eq!(json["title"], "Night of the Hunter");
        assert_eq!(
            json["video_url"],
            "/video?filename=Night%20of%20the%20Hunter.mkv"
        );
    }

    #[tokio::test]
    async fn test_source_starts_background_run() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let encoder = ScriptedEncoder::new(b"mp4".to_vec()).gated(gate.clone());
        let server = TestServer::new(encoder).await;
        let id = server.add_source("movie.avi", b"avi").await;

        let response = server.get("/filmes?filename=movie.avi", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["percent"], 0.0);
        assert!(server.state.coordinator.is_running(&id));

        gate.add_permits(1);
        let path = server.state.coordinator.ensure_ready(&id).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unknown_film_is_404() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let response = server.get("/filmes?filename=ghost.mkv", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_traversal_and_missing_filename_rejected() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        for uri in ["/filmes?filename=..", "/filmes?filename=a%2Fb", "/filmes"] {
            let response = server.get(uri, None).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_authorizer_denial_is_403() {
        let mut server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        server.state = server.state.clone().with_authorizer(Arc::new(DenyPrivate));
        server.add_source("private_cut.mkv", b"mkv").await;

        let response = server.get("/filmes?filename=private_cut.mkv", None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let id = SourceId::parse("private_cut.mkv").unwrap();
        assert!(!server.state.coordinator.is_running(&id));
    }
}
