//! Byte-range delivery of artifacts and sources.

pub mod range;
pub mod range_streamer;

pub use range::{RangeSpec, parse_range};
pub use range_streamer::{DEFAULT_CHUNK_SIZE, RangeStreamer, file_chunks};
