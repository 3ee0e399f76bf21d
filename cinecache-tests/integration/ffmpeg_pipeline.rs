//! Real encoder runs against generated media.
//!
//! Skipped when ffmpeg or ffprobe is not installed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cinecache_core::SourceId;
use cinecache_core::config::CinecacheConfig;
use cinecache_core::transcoding::{
    DurationProbe, FfmpegEncoder, FfprobeDurationProbe, JobStatus, TranscodeError,
};
use tokio::process::Command;

use crate::common::Library;

async fn tool_available(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Writes a short Matroska file with an H.264 video and an MP3 audio track.
async fn generate_mkv(path: &Path, seconds: u32) -> bool {
    let duration = seconds.to_string();
    Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size=160x120:rate=10:duration={duration}"))
        .args(["-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:duration={duration}"))
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "libmp3lame"])
        .arg(path)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

async fn ffmpeg_library() -> Option<Library> {
    if !tool_available("ffmpeg").await || !tool_available("ffprobe").await {
        eprintln!("Skipping test: ffmpeg/ffprobe not available");
        return None;
    }
    let transcode = CinecacheConfig::default().transcode;
    let library = Library::with(
        Arc::new(FfprobeDurationProbe::new(&transcode.ffprobe_path)),
        Arc::new(FfmpegEncoder::new(&transcode)),
        |config| config.transcode.encode_timeout = Some(Duration::from_secs(60)),
    )
    .await;
    Some(library)
}

#[tokio::test]
async fn test_mkv_becomes_faststart_mp4() {
    let Some(library) = ffmpeg_library().await else {
        return;
    };
    let source = library.source_dir().join("clip.mkv");
    if !generate_mkv(&source, 3).await {
        eprintln!("Skipping test: cannot generate test media");
        return;
    }

    let probe = FfprobeDurationProbe::new("ffprobe");
    let source_duration = probe.probe(&source).await;
    assert!((source_duration - 3.0).abs() < 0.5, "{source_duration}");

    let id = SourceId::parse("clip.mkv").unwrap();
    let artifact = library.state.coordinator.ensure_ready(&id).await.unwrap();

    assert!(artifact.ends_with("clip.mkv.mp4"));
    assert!(!source.exists());
    assert!(!library.state.store.partial_path(&id).exists());
    assert_eq!(library.state.tracker.status(&id), JobStatus::Done);

    let artifact_duration = probe.probe(&artifact).await;
    assert!((artifact_duration - source_duration).abs() < 0.5);

    // With faststart the moov box precedes mdat
    let bytes = tokio::fs::read(&artifact).await.unwrap();
    let moov = bytes.windows(4).position(|w| w == b"moov").unwrap();
    let mdat = bytes.windows(4).position(|w| w == b"mdat").unwrap();
    assert!(moov < mdat);
}

#[tokio::test]
async fn test_corrupt_source_fails_and_is_kept() {
    let Some(library) = ffmpeg_library().await else {
        return;
    };
    let id = library.add_source("garbage.avi", b"definitely not a video").await;

    let result = library.state.coordinator.ensure_ready(&id).await;
    assert!(matches!(result, Err(TranscodeError::EncodingFailed { .. })));
    assert!(library.state.store.find_source(&id).await.is_some());
    assert!(library.state.store.find_ready(&id).await.is_none());
    assert!(!library.state.store.partial_path(&id).exists());

    let job = library.state.tracker.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.total_duration_seconds, Some(1.0));
}
