//! Viewer workflow from first click to seeking playback.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use cinecache_core::transcoding::testing::ScriptedEncoder;
use tokio::sync::Semaphore;

use crate::common::{Library, body_bytes, body_json, film_bytes, get};

const ENTRY_URL: &str = "/filmes?filename=Tokyo_Story.mkv";
const PROGRESS_URL: &str = "/progress?filename=Tokyo_Story.mkv";

#[tokio::test]
async fn test_first_view_polls_progress_then_streams() {
    let payload = film_bytes(2048);
    let gate = Arc::new(Semaphore::new(0));
    let encoder = Arc::new(
        ScriptedEncoder::new(payload.clone())
            .with_progress(&[(12.5, 40.0), (50.0, 20.0), (87.5, 5.0)])
            .gated(gate.clone()),
    );
    let library = Library::scripted(encoder.clone()).await;
    library.add_source("Tokyo_Story.mkv", b"matroska").await;

    let entry = get(library.router(), ENTRY_URL, None).await;
    assert_eq!(entry.status(), StatusCode::OK);
    assert_eq!(body_json(entry).await["status"], "in_progress");

    // Poll until the encoder has reported its last sample
    let mut seen = Vec::new();
    loop {
        let report = body_json(get(library.router(), PROGRESS_URL, None).await).await;
        assert_eq!(report["status"], "in_progress");
        let percent = report["percent"].as_f64().unwrap();
        assert!(report["eta"].as_f64().unwrap() >= 0.0);
        seen.push(percent);
        if percent >= 87.5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");

    // A second viewer while the run is still open joins it
    let again = body_json(get(library.router(), ENTRY_URL, None).await).await;
    assert_eq!(again["status"], "in_progress");
    assert_eq!(again["percent"], 87.5);

    gate.add_permits(1);
    let video = get(library.router(), "/video?filename=Tokyo_Story.mkv", None).await;
    assert_eq!(video.status(), StatusCode::OK);
    assert_eq!(body_bytes(video).await, payload);

    let done = body_json(get(library.router(), PROGRESS_URL, None).await).await;
    assert_eq!(done["status"], "done");
    assert_eq!(done["percent"], 100.0);
    assert_eq!(done["eta"], 0.0);

    let ready = body_json(get(library.router(), ENTRY_URL, None).await).await;
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["title"], "Tokyo Story");
    let video_url = ready["video_url"].as_str().unwrap().to_string();

    let seek = get(library.router(), &video_url, Some("bytes=1024-")).await;
    assert_eq!(seek.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(seek.headers()[header::CONTENT_RANGE], "bytes 1024-2047/2048");
    assert_eq!(body_bytes(seek).await, &payload[1024..]);

    let download_url = ready["download_url"].as_str().unwrap().to_string();
    let download = get(library.router(), &download_url, None).await;
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(body_bytes(download).await, payload);

    assert_eq!(encoder.invocations(), 1);
}

#[tokio::test]
async fn test_library_listing_tracks_transcodes() {
    let library = Library::scripted(Arc::new(ScriptedEncoder::new(b"mp4".to_vec()))).await;
    library.add_source("Ikiru.mkv", b"mkv").await;
    library.add_source("Rashomon.avi", b"avi").await;

    let before = body_json(get(library.router(), "/list", None).await).await;
    assert_eq!(before["filmes"], serde_json::json!(["Ikiru.mkv", "Rashomon.avi"]));

    let video = get(library.router(), "/video?filename=Ikiru.mkv", None).await;
    assert_eq!(video.status(), StatusCode::OK);

    // Source is gone, but the artifact keeps the title listed
    let after = body_json(get(library.router(), "/list", None).await).await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_unknown_film_workflow() {
    let library = Library::scripted(Arc::new(ScriptedEncoder::new(b"mp4".to_vec()))).await;

    let entry = get(library.router(), "/filmes?filename=Missing.mkv", None).await;
    assert_eq!(entry.status(), StatusCode::NOT_FOUND);

    let progress = get(library.router(), "/progress?filename=Missing.mkv", None).await;
    let progress = body_json(progress).await;
    assert_eq!(progress["status"], "not_found");

    let video = get(library.router(), "/video?filename=Missing.mkv", None).await;
    assert_eq!(video.status(), StatusCode::NOT_FOUND);
}
