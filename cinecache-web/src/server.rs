//! Router assembly and listener for the Cinecache server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use cinecache_core::config::CinecacheConfig;
use cinecache_core::storage::StorageError;
use cinecache_core::transcoding::{FfmpegEncoder, FfprobeDurationProbe};
use cinecache_core::{ArtifactStore, ProgressTracker, SourceId, TranscodeCoordinator};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AllowAll, PlaybackAuthorizer};
use crate::error::WebError;
use crate::handlers::{download, library, playback, progress, video};
use crate::streaming::RangeStreamer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TranscodeCoordinator,
    pub tracker: ProgressTracker,
    pub store: ArtifactStore,
    pub streamer: RangeStreamer,
    pub authorizer: Arc<dyn PlaybackAuthorizer>,
}

impl AppState {
    /// Wraps a coordinator, sharing its store and tracker with the handlers.
    pub fn new(coordinator: TranscodeCoordinator, streamer: RangeStreamer) -> Self {
        Self {
            tracker: coordinator.tracker().clone(),
            store: coordinator.store().clone(),
            coordinator,
            streamer,
            authorizer: Arc::new(AllowAll),
        }
    }

    /// Production wiring: ffprobe and ffmpeg from the configured paths.
    pub fn from_config(config: &CinecacheConfig) -> Self {
        let coordinator = TranscodeCoordinator::new(
            ArtifactStore::new(&config.storage),
            ProgressTracker::new(),
            Arc::new(FfprobeDurationProbe::new(&config.transcode.ffprobe_path)),
            Arc::new(FfmpegEncoder::new(&config.transcode)),
            config.transcode.max_concurrent_transcodes,
        );
        Self::new(coordinator, RangeStreamer::new(config.server.stream_chunk_size))
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn PlaybackAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Validates a requested filename and checks the caller may play it.
    ///
    /// # Errors
    /// - `WebError::InvalidFilename` - Not a single path component
    /// - `WebError::Forbidden` - The authorizer denied access
    pub async fn authorize(&self, filename: &str) -> Result<SourceId, WebError> {
        let id = SourceId::parse(filename)?;
        if !self.authorizer.may_play(&id).await {
            return Err(WebError::Forbidden { source_id: id });
        }
        Ok(id)
    }
}

/// Startup failures of the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server stopped: {0}")]
    Serve(#[source] std::io::Error),
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/filmes", get(playback::playback_entry))
        .route("/progress", get(progress::progress))
        .route("/video", get(video::stream_video))
        .route("/download", get(download::download))
        .route("/list", get(library::list_films))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Prepares storage and serves until the listener fails.
///
/// # Errors
/// - `ServerError::Storage` - Media directories cannot be created or cleaned
/// - `ServerError::Bind` - The listen address is unavailable
/// - `ServerError::Serve` - The accept loop failed
pub async fn run_server(config: CinecacheConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(&config);
    state.store.ensure_dirs().await?;
    let purged = state.store.purge_partials().await?;
    if purged > 0 {
        info!("Removed {} partial artifacts from a previous run", purged);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local: Option<SocketAddr> = listener.local_addr().ok();

    info!(
        "Cinecache serving {} -> {} on http://{}",
        state.store.source_dir().display(),
        state.store.cache_dir().display(),
        local.map(|a| a.to_string()).unwrap_or(addr)
    );

    axum::serve(listener, build_router(state))
        .await
        .map_err(ServerError::Serve)
}
