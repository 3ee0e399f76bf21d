//! Cinecache Web - JSON and media delivery server
//!
//! Playback entry, progress polling, range-aware video delivery and downloads
//! on top of the transcoding cache in `cinecache-core`.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod streaming;

// Re-export main types
pub use auth::{AllowAll, PlaybackAuthorizer};
pub use error::WebError;
pub use server::{AppState, ServerError, build_router, run_server};
pub use streaming::{RangeSpec, RangeStreamer, parse_range};
