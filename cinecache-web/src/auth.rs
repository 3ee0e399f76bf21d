//! Authorization seam in front of every media endpoint.
//!
//! Authentication lives outside this server; the router only asks whether the
//! already-identified caller may play a given film.

use async_trait::async_trait;
use cinecache_core::SourceId;

/// Decides whether a request may access a film.
#[async_trait]
pub trait PlaybackAuthorizer: Send + Sync {
    async fn may_play(&self, id: &SourceId) -> bool;
}

/// Authorizer for deployments where every caller is trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PlaybackAuthorizer for AllowAll {
    async fn may_play(&self, _id: &SourceId) -> bool {
        true
    }
}
