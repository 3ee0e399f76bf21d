//! Filesystem mapping from source identifiers to source and artifact paths.
//!
//! The store keeps no state of its own beyond the two directories. An artifact
//! is written under a `.part` name and only renamed onto its final path after
//! the encoder exits successfully, so the existence of the final path is the
//! readiness signal.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::{StorageError, StorageResult};
use crate::config::StorageConfig;
use crate::source_id::SourceId;

/// Suffix appended to an artifact path while the encoder is still writing it.
pub const PARTIAL_SUFFIX: &str = "part";

/// Deterministic path layout for sources and their browser-playable artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    source_dir: PathBuf,
    cache_dir: PathBuf,
    artifact_extension: String,
    supported_extensions: Vec<String>,
}

impl ArtifactStore {
    /// Creates a store over the configured source and cache directories.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            artifact_extension: config.artifact_extension.to_string(),
            supported_extensions: config
                .supported_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the original upload for `id`.
    pub fn source_path(&self, id: &SourceId) -> PathBuf {
        self.source_dir.join(id.as_str())
    }

    /// Final artifact path: `<cache_dir>/<id>.<ext>`.
    pub fn artifact_path(&self, id: &SourceId) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", id.as_str(), self.artifact_extension))
    }

    /// Path the encoder writes to before the artifact is promoted.
    pub fn partial_path(&self, id: &SourceId) -> PathBuf {
        self.cache_dir.join(format!(
            "{}.{}.{PARTIAL_SUFFIX}",
            id.as_str(),
            self.artifact_extension
        ))
    }

    /// Returns the artifact path if a completed artifact exists.
    pub async fn find_ready(&self, id: &SourceId) -> Option<PathBuf> {
        let path = self.artifact_path(id);
        is_regular_file(&path).await.then_some(path)
    }

    /// Returns the source path if the original upload exists.
    pub async fn find_source(&self, id: &SourceId) -> Option<PathBuf> {
        let path = self.source_path(id);
        is_regular_file(&path).await.then_some(path)
    }

    /// Creates the source and cache directories if missing.
    ///
    /// # Errors
    /// - `StorageError::Io` - A directory cannot be created
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        for dir in [&self.source_dir, &self.cache_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Io {
                    operation: "create directory",
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Deletes partial artifacts left behind by a process that stopped mid-run.
    ///
    /// Job state is in-memory only, so nothing can resume a partial file after
    /// a restart. Returns the number of files removed.
    ///
    /// # Errors
    /// - `StorageError::Io` - The cache directory cannot be listed
    pub async fn purge_partials(&self) -> StorageResult<usize> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StorageError::Io {
                    operation: "list cache directory",
                    path: self.cache_dir.clone(),
                    source,
                });
            }
        };

        let suffix = format!(".{PARTIAL_SUFFIX}");
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Io {
                operation: "list cache directory",
                path: self.cache_dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));
            if !is_partial {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!("Removed orphaned partial artifact {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove partial artifact {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    /// Removes the original upload once its artifact is ready.
    ///
    /// Returns `false` when the source was already gone.
    ///
    /// # Errors
    /// - `StorageError::Io` - The file exists but cannot be removed
    pub async fn delete_source(&self, id: &SourceId) -> StorageResult<bool> {
        let path = self.source_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted source {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                operation: "delete source",
                path,
                source,
            }),
        }
    }

    /// Lists every title that is playable now or after a transcode.
    ///
    /// Union of supported source files and completed artifacts (artifact name
    /// minus its extension), sorted and de-duplicated. Missing directories
    /// contribute nothing.
    ///
    /// # Errors
    /// - `StorageError::Io` - A directory exists but cannot be listed
    pub async fn list_titles(&self) -> StorageResult<Vec<String>> {
        let mut titles = BTreeSet::new();

        for name in list_file_names(&self.source_dir).await? {
            let supported = Path::new(&name)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    self.supported_extensions
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(ext))
                });
            if supported {
                titles.insert(name);
            }
        }

        let artifact_suffix = format!(".{}", self.artifact_extension);
        for name in list_file_names(&self.cache_dir).await? {
            if let Some(stem) = name.strip_suffix(&artifact_suffix) {
                if !stem.is_empty() {
                    titles.insert(stem.to_string());
                }
            }
        }

        Ok(titles.into_iter().collect())
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

async fn list_file_names(dir: &Path) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StorageError::Io {
                operation: "list directory",
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| StorageError::Io {
            operation: "list directory",
            path: dir.to_path_buf(),
            source,
        })?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
