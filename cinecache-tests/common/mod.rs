//! Fixtures shared by the integration and end-to-end suites.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use cinecache_core::config::CinecacheConfig;
use cinecache_core::transcoding::testing::{FixedDurationProbe, ScriptedEncoder};
use cinecache_core::transcoding::{DurationProbe, Encoder};
use cinecache_core::{ArtifactStore, ProgressTracker, SourceId, TranscodeCoordinator};
use cinecache_web::{AppState, RangeStreamer, build_router};
use tempfile::TempDir;
use tower::ServiceExt;

/// Media library rooted in a scratch directory.
pub struct Library {
    pub dir: TempDir,
    pub config: CinecacheConfig,
    pub state: AppState,
}

impl Library {
    pub async fn scripted(encoder: Arc<ScriptedEncoder>) -> Self {
        Self::with(Arc::new(FixedDurationProbe::new(60.0)), encoder, |_| {}).await
    }

    pub async fn with(
        probe: Arc<dyn DurationProbe>,
        encoder: Arc<dyn Encoder>,
        tweak: impl FnOnce(&mut CinecacheConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = CinecacheConfig::for_testing(dir.path());
        tweak(&mut config);

        let store = ArtifactStore::new(&config.storage);
        store.ensure_dirs().await.unwrap();
        let coordinator = TranscodeCoordinator::new(
            store,
            ProgressTracker::new(),
            probe,
            encoder,
            config.transcode.max_concurrent_transcodes,
        );
        let state = AppState::new(
            coordinator,
            RangeStreamer::new(config.server.stream_chunk_size),
        );
        Self { dir, config, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn source_dir(&self) -> &Path {
        &self.config.storage.source_dir
    }

    pub async fn add_source(&self, name: &str, data: &[u8]) -> SourceId {
        let id = SourceId::parse(name).unwrap();
        tokio::fs::write(self.state.store.source_path(&id), data)
            .await
            .unwrap();
        id
    }
}

pub async fn get(router: Router, uri: &str, range: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(range) = range {
        request = request.header("range", range);
    }
    router
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn film_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}
