//! Source and artifact file layout on disk.

pub mod artifact_store;

use std::path::PathBuf;

pub use artifact_store::{ArtifactStore, PARTIAL_SUFFIX};

/// Filesystem failures outside the hot path of existence checks.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
