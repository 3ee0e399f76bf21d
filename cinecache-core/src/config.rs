//! Centralized configuration for Cinecache.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Central configuration for all Cinecache components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct CinecacheConfig {
    pub storage: StorageConfig,
    pub transcode: TranscodeConfig,
    pub server: ServerConfig,
}

/// Source and cache directory layout.
///
/// One artifact per source identifier lives in `cache_dir`, named
/// `<identifier>.<artifact_extension>`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding original uploads
    pub source_dir: PathBuf,
    /// Directory holding browser-playable artifacts
    pub cache_dir: PathBuf,
    /// Extension appended to the identifier to name its artifact
    pub artifact_extension: &'static str,
    /// Source extensions listed as titles (lowercase, without dot)
    pub supported_extensions: Vec<&'static str>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("media/sources"),
            cache_dir: PathBuf::from("media/transcoded"),
            artifact_extension: "mp4",
            supported_extensions: vec!["mp4", "mkv", "avi", "mov", "flv"],
        }
    }
}

/// External encoder and inspector configuration.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path or name of the ffprobe binary
    pub ffprobe_path: PathBuf,
    /// Audio codec for the output (video is always stream-copied)
    pub audio_codec: String,
    /// Audio bitrate passed to the encoder
    pub audio_bitrate: String,
    /// Maximum encoder processes running at once across all identifiers
    pub max_concurrent_transcodes: usize,
    /// Wall-clock limit for one encoder run (None = unlimited)
    pub encode_timeout: Option<Duration>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            max_concurrent_transcodes: 2,
            encode_timeout: Some(Duration::from_secs(6 * 60 * 60)), // 6 hours
        }
    }
}

/// HTTP listener and delivery configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Upper bound on bytes read per streamed chunk
    pub stream_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            stream_chunk_size: 512 * 1024, // 512 KiB
        }
    }
}

impl CinecacheConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Storage overrides
        if let Ok(dir) = std::env::var("CINECACHE_SOURCE_DIR") {
            config.storage.source_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("CINECACHE_CACHE_DIR") {
            config.storage.cache_dir = PathBuf::from(dir);
        }

        // Transcode overrides
        if let Ok(path) = std::env::var("CINECACHE_FFMPEG") {
            config.transcode.ffmpeg_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("CINECACHE_FFPROBE") {
            config.transcode.ffprobe_path = PathBuf::from(path);
        }

        if let Ok(bitrate) = std::env::var("CINECACHE_AUDIO_BITRATE") {
            config.transcode.audio_bitrate = bitrate;
        }

        if let Ok(max) = std::env::var("CINECACHE_MAX_TRANSCODES") {
            if let Ok(count) = max.parse::<usize>() {
                config.transcode.max_concurrent_transcodes = count.max(1);
            }
        }

        if let Ok(timeout) = std::env::var("CINECACHE_ENCODE_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.transcode.encode_timeout = match seconds {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                };
            }
        }

        // Server overrides
        if let Ok(host) = std::env::var("CINECACHE_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("CINECACHE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        if let Ok(chunk) = std::env::var("CINECACHE_CHUNK_SIZE") {
            if let Ok(bytes) = chunk.parse::<usize>() {
                config.server.stream_chunk_size = bytes.max(1);
            }
        }

        config
    }

    /// Creates a configuration rooted in a scratch directory for tests.
    pub fn for_testing(root: &Path) -> Self {
        Self {
            storage: StorageConfig {
                source_dir: root.join("sources"),
                cache_dir: root.join("transcoded"),
                ..Default::default()
            },
            transcode: TranscodeConfig {
                encode_timeout: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            server: ServerConfig {
                port: 0,
                stream_chunk_size: 64,
                ..Default::default()
            },
        }
    }
}
