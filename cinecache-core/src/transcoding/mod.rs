//! On-demand conversion of sources into browser-playable artifacts.
//!
//! # Architecture
//!
//! - `TranscodeCoordinator`: Single-flight cache in front of the encoder
//! - `ProgressTracker`: Per-identifier job table polled by viewers
//! - `DurationProbe`: Source duration lookup feeding percentage math
//! - `Encoder`: Runs the external encoder and parses its progress stream

pub mod coordinator;
pub mod encoder;
pub mod probe;
pub mod progress_events;
pub mod tracker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use coordinator::{RunAttachment, RunSubscription, TranscodeCoordinator};
pub use encoder::{Encoder, EncodingError, FfmpegEncoder, ProgressEstimate, ProgressSample};
pub use probe::{DEFAULT_DURATION_SECS, DurationProbe, FfprobeDurationProbe, ProbeError};
pub use progress_events::{EncoderLine, ProgressEvent};
pub use tracker::{Job, JobStatus, ProgressReport, ProgressTracker};

use crate::source_id::SourceId;

/// Outcome shared with every waiter of a failed run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranscodeError {
    #[error("No source or artifact for {source_id}")]
    SourceMissing { source_id: SourceId },

    #[error("Transcode failed: {reason}")]
    EncodingFailed { reason: String },
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;
