//! End-to-end tests for Cinecache
//!
//! Complete viewer workflows driven through the router: open the playback
//! page, poll progress, then stream and download the result.

#[path = "../common/mod.rs"]
mod common;

mod playback_workflow;
