//! HTTP handlers, one module per endpoint.

pub mod download;
pub mod library;
pub mod playback;
pub mod progress;
pub mod video;

use serde::Deserialize;

/// `?filename=<id>` query shared by every media endpoint.
///
/// A missing parameter deserializes to an empty name, which identifier
/// validation rejects with a JSON 400.
#[derive(Debug, Deserialize)]
pub struct FilenameQuery {
    #[serde(default)]
    pub filename: String,
}
