//! Source duration lookup via an external media inspector.
//!
//! Duration only feeds percentage and ETA display, so every failure collapses
//! into [`DEFAULT_DURATION_SECS`] instead of failing the transcode.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Duration assumed when probing fails; keeps percentage math finite.
pub const DEFAULT_DURATION_SECS: f64 = 1.0;

/// Looks up the playback duration of a source file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Returns the container duration in seconds, or [`DEFAULT_DURATION_SECS`].
    async fn probe(&self, source: &Path) -> f64;
}

/// Reasons a probe fell back to the default duration.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to run inspector: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Inspector exited with {status}")]
    Exit { status: std::process::ExitStatus },

    #[error("Inspector output is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Inspector output has no format duration")]
    MissingDuration,

    #[error("Unusable duration value: {value}")]
    InvalidDuration { value: String },
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<DurationField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationField {
    Text(String),
    Number(f64),
}

/// Extracts `format.duration` from `ffprobe -print_format json -show_format`.
///
/// # Errors
/// - `ProbeError::Parse` - Output is not JSON
/// - `ProbeError::MissingDuration` - No `format.duration` field
/// - `ProbeError::InvalidDuration` - Duration is not a positive finite number
pub fn parse_ffprobe_duration(stdout: &[u8]) -> Result<f64, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)?;
    let field = output
        .format
        .and_then(|format| format.duration)
        .ok_or(ProbeError::MissingDuration)?;

    let (seconds, raw) = match field {
        DurationField::Text(text) => (text.trim().parse::<f64>().ok(), text),
        DurationField::Number(n) => (Some(n), n.to_string()),
    };

    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => Ok(s),
        _ => Err(ProbeError::InvalidDuration { value: raw }),
    }
}

/// Production probe shelling out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    ffprobe_path: PathBuf,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Runs the inspector and reports why it failed, if it did.
    ///
    /// # Errors
    /// Any `ProbeError` variant; see [`parse_ffprobe_duration`] for parse failures.
    pub async fn try_probe(&self, source: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(source)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Exit {
                status: output.status,
            });
        }

        parse_ffprobe_duration(&output.stdout)
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe(&self, source: &Path) -> f64 {
        match self.try_probe(source).await {
            Ok(seconds) => {
                debug!("Probed {}: {:.2}s", source.display(), seconds);
                seconds
            }
            Err(e) => {
                warn!(
                    "Duration probe failed for {}, assuming {}s: {}",
                    source.display(),
                    DEFAULT_DURATION_SECS,
                    e
                );
                DEFAULT_DURATION_SECS
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_duration() {
        let json = br#"{"format": {"filename": "a.mkv", "duration": "5423.120000"}}"#;
        let seconds = parse_ffprobe_duration(json).unwrap();
        assert!((seconds - 5423.12).abs() < 1e-9);
    }

    #[test]
    fn test_parse_numeric_duration() {
        let json = br#"{"format": {"duration": 12.5}}"#;
        assert_eq!(parse_ffprobe_duration(json).unwrap(), 12.5);
    }

    #[test]
    fn test_parse_rejects_missing_and_invalid() {
        assert!(matches!(
            parse_ffprobe_duration(br#"{}"#),
            Err(ProbeError::MissingDuration)
        ));
        assert!(matches!(
            parse_ffprobe_duration(br#"{"format": {}}"#),
            Err(ProbeError::MissingDuration)
        ));
        assert!(matches!(
            parse_ffprobe_duration(br#"{"format": {"duration": "N/A"}}"#),
            Err(ProbeError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_ffprobe_duration(br#"{"format": {"duration": "0.000"}}"#),
            Err(ProbeError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_ffprobe_duration(b"not json"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_falls_back_to_default() {
        let probe = FfprobeDurationProbe::new("/nonexistent/cinecache-ffprobe");
        let seconds = probe.probe(Path::new("/nonexistent/movie.mkv")).await;
        assert_eq!(seconds, DEFAULT_DURATION_SECS);
    }
}
