//! Progress polling.

use axum::Json;
use axum::extract::{Query, State};
use cinecache_core::SourceId;
use cinecache_core::transcoding::ProgressReport;

use super::FilenameQuery;
use crate::error::WebError;
use crate::server::AppState;

/// `GET /progress?filename=<id>`
///
/// Never fails for names the tracker has not seen, including names that
/// could not identify a film at all; those report `not_found`.
///
/// # Errors
/// - `WebError::Forbidden` - The authorizer denied access
pub async fn progress(
    State(state): State<AppState>,
    Query(query): Query<FilenameQuery>,
) -> Result<Json<ProgressReport>, WebError> {
    if SourceId::parse(&query.filename).is_err() {
        return Ok(Json(ProgressReport::not_found()));
    }
    let id = state.authorize(&query.filename).await?;
    Ok(Json(state.tracker.report(&id)))
}
