//! Range delivery against artifacts produced by the coordinator.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use cinecache_core::transcoding::testing::ScriptedEncoder;
use futures::future::join_all;

use crate::common::{Library, body_bytes, film_bytes, get};

#[tokio::test]
async fn test_thousand_byte_artifact_range_matrix() {
    let payload = film_bytes(1000);
    let library = Library::scripted(Arc::new(ScriptedEncoder::new(payload.clone()))).await;
    library.add_source("movie.mkv", b"mkv").await;

    let cases: [(Option<&str>, StatusCode, Option<&str>, std::ops::Range<usize>); 5] = [
        (None, StatusCode::OK, None, 0..1000),
        (
            Some("bytes=100-199"),
            StatusCode::PARTIAL_CONTENT,
            Some("bytes 100-199/1000"),
            100..200,
        ),
        (
            Some("bytes=990-"),
            StatusCode::PARTIAL_CONTENT,
            Some("bytes 990-999/1000"),
            990..1000,
        ),
        (
            Some("bytes=1000-1010"),
            StatusCode::RANGE_NOT_SATISFIABLE,
            Some("bytes */1000"),
            0..0,
        ),
        (
            Some("frames=1-2"),
            StatusCode::PARTIAL_CONTENT,
            Some("bytes 0-999/1000"),
            0..1000,
        ),
    ];

    for (range, status, content_range, span) in cases {
        let response = get(library.router(), "/video?filename=movie.mkv", range).await;
        assert_eq!(response.status(), status, "{range:?}");
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .map(|v| v.to_str().unwrap()),
            content_range,
            "{range:?}"
        );
        assert_eq!(body_bytes(response).await, &payload[span], "{range:?}");
    }
}

#[tokio::test]
async fn test_concurrent_seeks_into_large_artifact() {
    let payload = film_bytes(256 * 1024);
    let library = Library::scripted(Arc::new(ScriptedEncoder::new(payload.clone()))).await;
    library.add_source("long.mkv", b"mkv").await;

    let offsets: Vec<usize> = (0..16).map(|i| i * 16 * 1024).collect();
    let requests = offsets.iter().map(|&start| {
        let router = library.router();
        async move {
            let range = format!("bytes={}-{}", start, start + 4095);
            let response = get(router, "/video?filename=long.mkv", Some(&range)).await;
            (start, response.status(), body_bytes(response).await)
        }
    });

    for (start, status, body) in join_all(requests).await {
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, &payload[start..start + 4096]);
    }
}

#[tokio::test]
async fn test_download_serves_source_before_transcode() {
    let library = Library::scripted(Arc::new(ScriptedEncoder::new(b"mp4".to_vec()))).await;
    let original = film_bytes(777);
    library.add_source("Ran.mkv", &original).await;

    let response = get(library.router(), "/download?filename=Ran.mkv", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "777");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename*=UTF-8''Ran.mkv")
    );
    assert_eq!(body_bytes(response).await, original);
}
