//! Many viewers, one encoder run.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use cinecache_core::transcoding::JobStatus;
use cinecache_core::transcoding::testing::ScriptedEncoder;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::common::{Library, body_bytes, film_bytes, get};

#[tokio::test]
async fn test_concurrent_video_requests_share_one_transcode() {
    let payload = film_bytes(4096);
    let encoder = Arc::new(
        ScriptedEncoder::new(payload.clone())
            .with_progress(&[(25.0, 3.0), (75.0, 1.0)])
            .with_delay(Duration::from_millis(30)),
    );
    let library = Library::scripted(encoder.clone()).await;
    let id = library.add_source("Stalker.mkv", b"matroska").await;

    let requests = (0..12).map(|i| {
        let router = library.router();
        let range = (i % 2 == 0).then_some("bytes=0-99");
        async move { get(router, "/video?filename=Stalker.mkv", range).await }
    });
    let responses = join_all(requests).await;

    for response in responses {
        let status = response.status();
        let body = body_bytes(response).await;
        match status {
            StatusCode::OK => assert_eq!(body, payload),
            StatusCode::PARTIAL_CONTENT => assert_eq!(body, &payload[..100]),
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(encoder.invocations(), 1);
    assert_eq!(library.state.tracker.status(&id), JobStatus::Done);
    assert!(library.state.store.find_source(&id).await.is_none());
}

#[tokio::test]
async fn test_different_films_transcode_independently() {
    let encoder = Arc::new(ScriptedEncoder::new(b"mp4".to_vec()));
    let library = Library::scripted(encoder.clone()).await;
    for name in ["a.mkv", "b.avi", "c.mov"] {
        library.add_source(name, b"src").await;
    }

    let requests = ["a.mkv", "b.avi", "c.mov"].map(|name| {
        let router = library.router();
        async move { get(router, &format!("/video?filename={name}"), None).await }
    });
    for response in join_all(requests).await {
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(encoder.invocations(), 3);
}

#[tokio::test]
async fn test_failed_run_reaches_all_waiters_then_retries() {
    let gate = Arc::new(Semaphore::new(0));
    let encoder = Arc::new(
        ScriptedEncoder::new(b"mp4".to_vec())
            .gated(gate.clone())
            .failing_first(1),
    );
    let library = Library::scripted(encoder.clone()).await;
    let id = library.add_source("broken.avi", b"avi").await;

    // Registers the run; the encoder then parks on the gate
    let entry = get(library.router(), "/filmes?filename=broken.avi", None).await;
    assert_eq!(entry.status(), StatusCode::OK);
    assert!(library.state.coordinator.is_running(&id));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let router = library.router();
            tokio::spawn(async move { get(router, "/video?filename=broken.avi", None).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    for waiter in join_all(waiters).await {
        assert_eq!(
            waiter.unwrap().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
    assert_eq!(encoder.invocations(), 1);
    assert_eq!(library.state.tracker.status(&id), JobStatus::Error);
    assert!(library.state.store.find_source(&id).await.is_some());

    gate.add_permits(1);
    let retried = get(library.router(), "/video?filename=broken.avi", None).await;
    assert_eq!(retried.status(), StatusCode::OK);
    assert_eq!(encoder.invocations(), 2);
}
