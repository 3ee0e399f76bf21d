//! Integration tests for Cinecache
//!
//! Exercise the coordinator, store and router together through the HTTP
//! surface, with scripted encoders and, where available, the real ffmpeg.

#[path = "common/mod.rs"]
mod common;

#[path = "integration/ffmpeg_pipeline.rs"]
mod ffmpeg_pipeline;
#[path = "integration/range_delivery.rs"]
mod range_delivery;
#[path = "integration/single_flight.rs"]
mod single_flight;
