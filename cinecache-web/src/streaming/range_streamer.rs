//! Incremental file delivery honoring HTTP Range requests.
//!
//! Files are never loaded whole: the response body pulls at most one chunk at
//! a time from an open file handle, which is dropped with the body when the
//! client disconnects.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use futures::stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::range::{RangeSpec, parse_range};
use crate::error::WebError;

/// Upper bound on bytes read per body chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Serves files as full, partial or attachment responses.
#[derive(Debug, Clone, Copy)]
pub struct RangeStreamer {
    chunk_size: usize,
}

impl Default for RangeStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl RangeStreamer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Streams a video artifact, honoring an optional Range header.
    ///
    /// # Errors
    /// - `WebError::RangeNotSatisfiable` - Range starts at or after end of file
    /// - `WebError::Io` - The file cannot be opened, measured or seeked
    pub async fn serve(&self, path: &Path, range: Option<&str>) -> Result<Response, WebError> {
        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();

        match parse_range(range, size) {
            RangeSpec::Unsatisfiable => {
                debug!("Unsatisfiable range {:?} for {} bytes", range, size);
                Err(WebError::RangeNotSatisfiable { size })
            }
            RangeSpec::Full => {
                let body = Body::from_stream(file_chunks(file, size, self.chunk_size));
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, VIDEO_CONTENT_TYPE)
                    .header(header::CONTENT_LENGTH, size.to_string())
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(body)
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
            }
            RangeSpec::Partial { start, end } => {
                file.seek(SeekFrom::Start(start)).await?;
                let length = end - start + 1;
                debug!("Serving bytes {}-{}/{} of {}", start, end, size, path.display());

                let body = Body::from_stream(file_chunks(file, length, self.chunk_size));
                Ok(Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, VIDEO_CONTENT_TYPE)
                    .header(header::CONTENT_LENGTH, length.to_string())
                    .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(body)
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
            }
        }
    }

    /// Streams a whole file as a download named `filename`.
    ///
    /// # Errors
    /// - `WebError::Io` - The file cannot be opened or measured
    pub async fn serve_attachment(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<Response, WebError> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();

        let disposition = content_disposition(filename);
        let body = Body::from_stream(file_chunks(file, size, self.chunk_size));
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, size.to_string())
            .header(header::CONTENT_DISPOSITION, disposition)
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
    }
}

/// Yields up to `length` bytes from the file's current position, one chunk
/// of at most `chunk_size` bytes per item.
///
/// Ends early if the file turns out shorter than expected.
pub fn file_chunks(
    file: File,
    length: u64,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    stream::unfold((file, length), move |(mut file, remaining)| async move {
        if remaining == 0 {
            return None;
        }

        let want = remaining.min(chunk_size as u64) as usize;
        let mut buffer = vec![0u8; want];
        match file.read(&mut buffer).await {
            Ok(0) => None,
            Ok(read) => {
                buffer.truncate(read);
                Some((Ok(Bytes::from(buffer)), (file, remaining - read as u64)))
            }
            Err(e) => Some((Err(e), (file, 0))),
        }
    })
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;

    async fn artifact(dir: &TempDir, len: usize) -> std::path::PathBuf {
        let path = dir.path().join("movie.mkv.mp4");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    async fn body_of(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_full_response() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 1000).await;

        let response = RangeStreamer::new(64).serve(&path, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(body_of(response).await, tokio::fs::read(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_range() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 1000).await;
        let original = tokio::fs::read(&path).await.unwrap();

        let response = RangeStreamer::new(64)
            .serve(&path, Some("bytes=100-199"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(body_of(response).await, &original[100..200]);
    }

    #[tokio::test]
    async fn test_open_ended_range() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 1000).await;
        let original = tokio::fs::read(&path).await.unwrap();

        let response = RangeStreamer::default()
            .serve(&path, Some("bytes=990-"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
        assert_eq!(body_of(response).await, &original[990..]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 1000).await;

        let result = RangeStreamer::default()
            .serve(&path, Some("bytes=1000-1010"))
            .await;
        assert!(matches!(
            result,
            Err(WebError::RangeNotSatisfiable { size: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_malformed_range_serves_whole_file_as_partial() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 300).await;

        let response = RangeStreamer::new(64)
            .serve(&path, Some("bytes=oops"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-299/300");
        assert_eq!(body_of(response).await.len(), 300);
    }

    #[tokio::test]
    async fn test_chunks_are_bounded() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 1000).await;
        let file = File::open(&path).await.unwrap();

        let sizes: Vec<usize> = file_chunks(file, 1000, 64)
            .map(|chunk| chunk.unwrap().len())
            .collect()
            .await;
        assert!(sizes.iter().all(|&n| n <= 64));
        assert_eq!(sizes.iter().sum::<usize>(), 1000);
    }

    #[tokio::test]
    async fn test_attachment_headers() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, 10).await;

        let response = RangeStreamer::default()
            .serve_attachment(&path, "Amélie.mkv.mp4")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"Am_lie.mkv.mp4\""));
        assert!(disposition.ends_with("filename*=UTF-8''Am%C3%A9lie.mkv.mp4"));
        assert_eq!(body_of(response).await.len(), 10);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = RangeStreamer::default()
            .serve(&dir.path().join("absent.mp4"), None)
            .await;
        assert!(matches!(result, Err(WebError::Io(_))));
    }
}
