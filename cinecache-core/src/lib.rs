//! Cinecache Core - On-demand transcoding cache for a personal film library
//!
//! This crate owns everything below the HTTP surface: identifier validation,
//! on-disk layout of sources and artifacts, the single-flight transcode
//! coordinator, progress tracking, and configuration.

pub mod config;
pub mod source_id;
pub mod storage;
pub mod tracing_setup;
pub mod transcoding;

// Re-export main types for convenient access
pub use config::CinecacheConfig;
pub use source_id::{SourceId, SourceIdError};
pub use storage::{ArtifactStore, StorageError};
pub use transcoding::{ProgressTracker, TranscodeCoordinator, TranscodeError};

/// Core errors that can bubble up from any Cinecache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CinecacheError {
    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid identifier: {0}")]
    SourceId(#[from] SourceIdError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CinecacheError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            CinecacheError::Transcode(e) => match e {
                TranscodeError::SourceMissing { source_id } => {
                    format!("Film {} not found", source_id.display_title())
                }
                TranscodeError::EncodingFailed { .. } => "Could not prepare film".to_string(),
            },
            CinecacheError::Storage(_) => "Storage error occurred".to_string(),
            CinecacheError::SourceId(e) => format!("Invalid film name: {e}"),
            CinecacheError::Configuration { .. } => "Configuration error occurred".to_string(),
            CinecacheError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CinecacheError::SourceId(_)
                | CinecacheError::Configuration { .. }
                | CinecacheError::Transcode(TranscodeError::SourceMissing { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CinecacheError>;
