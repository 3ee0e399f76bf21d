//! Film listing.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::error::WebError;
use crate::server::AppState;

/// `GET /list` - every title with a source or a finished artifact.
///
/// # Errors
/// - `WebError::Storage` - A media directory cannot be read
pub async fn list_films(State(state): State<AppState>) -> Result<Json<Value>, WebError> {
    let titles = state.store.list_titles().await?;
    Ok(Json(json!({ "filmes": titles })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use cinecache_core::transcoding::testing::ScriptedEncoder;
    use serde_json::json;

    use crate::handlers::test_support::{TestServer, body_json};

    #[tokio::test]
    async fn test_lists_union_of_sources_and_artifacts() {
        let server = TestServer::new(ScriptedEncoder::new(b"mp4".to_vec())).await;
        server.add_source("b.mkv", b"mkv").await;
        server.add_source("notes.txt", b"txt").await;
        server.add_artifact("a.avi", b"mp4").await;
        server.add_artifact("b.mkv", b"mp4").await;

        let response = server.get("/list", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"filmes": ["a.avi", "b.mkv"]})
        );
    }
}
