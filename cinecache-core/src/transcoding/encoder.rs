//! External encoder invocation and progress estimation.
//!
//! The output profile is fixed: video is stream-copied, audio is re-encoded to
//! AAC, and the `moov` atom is moved to the front so browsers can start
//! playback and seek before downloading the whole file.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use super::probe::DEFAULT_DURATION_SECS;
use super::progress_events::{EncoderLine, ProgressEvent, encoder_lines};
use crate::config::TranscodeConfig;

/// Number of diagnostic lines kept for failure reports.
const DIAGNOSTIC_TAIL: usize = 20;

/// Progress forwarded to the caller after every timing marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Completion in percent, within `[0, 100]`
    pub percent: f64,
    /// Estimated seconds until the encoder finishes, never negative
    pub eta_seconds: f64,
}

/// Derived progress figures for one timing marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    pub percent: f64,
    /// Output seconds produced per wall-clock second
    pub speed: f64,
    pub eta_seconds: f64,
}

impl ProgressEstimate {
    /// Computes percent, speed and ETA from the encoder's output position.
    ///
    /// A non-positive `total_duration_secs` is replaced by
    /// [`DEFAULT_DURATION_SECS`]. ETA is zero while speed is unknown.
    pub fn compute(
        elapsed_output_secs: f64,
        wall_elapsed_secs: f64,
        total_duration_secs: f64,
    ) -> Self {
        let total = if total_duration_secs.is_finite() && total_duration_secs > 0.0 {
            total_duration_secs
        } else {
            DEFAULT_DURATION_SECS
        };
        let output = if elapsed_output_secs.is_finite() {
            elapsed_output_secs.max(0.0)
        } else {
            0.0
        };

        let percent = (output / total * 100.0).clamp(0.0, 100.0);
        let speed = if wall_elapsed_secs.is_finite() && wall_elapsed_secs > 0.0 {
            output / wall_elapsed_secs
        } else {
            0.0
        };
        let eta_seconds = if speed > 0.0 && speed.is_finite() {
            ((total - output) / speed).max(0.0)
        } else {
            0.0
        };

        Self {
            percent,
            speed,
            eta_seconds,
        }
    }

    pub fn sample(&self) -> ProgressSample {
        ProgressSample {
            percent: self.percent,
            eta_seconds: self.eta_seconds,
        }
    }
}

/// Terminal failures of an encoder run.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Failed to start encoder: {reason}")]
    Spawn { reason: String },

    #[error("Encoder exited with {status}: {diagnostics}")]
    ProcessFailed { status: String, diagnostics: String },

    #[error("Encoder exceeded {}s and was killed", .limit.as_secs())]
    TimedOut { limit: Duration },

    #[error("Encoder I/O failed: {reason}")]
    Io { reason: String },
}

/// Converts one source into a browser-playable artifact.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encodes `source` into `target`, reporting progress as it goes.
    ///
    /// `target` must not be treated as usable unless this returns `Ok`.
    ///
    /// # Errors
    /// - `EncodingError::Spawn` - The process could not be started
    /// - `EncodingError::ProcessFailed` - Non-zero exit
    /// - `EncodingError::TimedOut` - Wall-clock limit reached
    /// - `EncodingError::Io` - Waiting on the process failed
    async fn run(
        &self,
        source: &Path,
        target: &Path,
        total_duration_secs: f64,
        on_progress: &(dyn Fn(ProgressSample) + Send + Sync),
    ) -> Result<(), EncodingError>;
}

/// Production encoder driving the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    audio_codec: String,
    audio_bitrate: String,
    timeout: Option<Duration>,
}

impl FfmpegEncoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            timeout: config.encode_timeout,
        }
    }

    /// Builds the fixed-profile command line.
    pub fn command(&self, source: &Path, target: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-nostdin")
            .arg("-i")
            .arg(source)
            // Subtitle and attachment streams are not valid in MP4
            .args(["-map", "0:v?", "-map", "0:a?"])
            .args(["-c:v", "copy"])
            .arg("-c:a")
            .arg(&self.audio_codec)
            .arg("-b:a")
            .arg(&self.audio_bitrate)
            .args(["-movflags", "+faststart"])
            .args(["-progress", "pipe:2", "-nostats"])
            // Target carries a temporary suffix, so the muxer cannot be inferred
            .args(["-f", "mp4"])
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn pump_until_exit(
        child: &mut Child,
        total_duration_secs: f64,
        on_progress: &(dyn Fn(ProgressSample) + Send + Sync),
    ) -> Result<(ExitStatus, VecDeque<String>), EncodingError> {
        let stderr = child.stderr.take().ok_or_else(|| EncodingError::Spawn {
            reason: "stderr was not captured".to_string(),
        })?;

        let started = Instant::now();
        let mut diagnostics = VecDeque::with_capacity(DIAGNOSTIC_TAIL);
        let mut lines = pin!(encoder_lines(BufReader::new(stderr)));

        while let Some(line) = lines.next().await {
            match line {
                EncoderLine::Event(ProgressEvent::OutTime { seconds }) => {
                    let estimate = ProgressEstimate::compute(
                        seconds,
                        started.elapsed().as_secs_f64(),
                        total_duration_secs,
                    );
                    trace!(
                        "Encoder at {:.1}s: {:.1}% speed={:.2}x eta={:.0}s",
                        seconds, estimate.percent, estimate.speed, estimate.eta_seconds
                    );
                    on_progress(estimate.sample());
                }
                EncoderLine::Event(ProgressEvent::End) => {
                    debug!("Encoder reported end of output");
                }
                EncoderLine::Status => {}
                EncoderLine::Diagnostic(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    if diagnostics.len() == DIAGNOSTIC_TAIL {
                        diagnostics.pop_front();
                    }
                    diagnostics.push_back(text);
                }
            }
        }

        let status = child.wait().await.map_err(|e| EncodingError::Io {
            reason: format!("waiting for encoder: {e}"),
        })?;
        Ok((status, diagnostics))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(
        &self,
        source: &Path,
        target: &Path,
        total_duration_secs: f64,
        on_progress: &(dyn Fn(ProgressSample) + Send + Sync),
    ) -> Result<(), EncodingError> {
        let mut cmd = self.command(source, target);
        info!(
            "Starting encoder: {} -> {}",
            source.display(),
            target.display()
        );
        debug!("Encoder command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| EncodingError::Spawn {
            reason: format!("{}: {e}", self.ffmpeg_path.display()),
        })?;

        let pumped = match self.timeout {
            Some(limit) => {
                let attempt = tokio::time::timeout(
                    limit,
                    Self::pump_until_exit(&mut child, total_duration_secs, on_progress),
                )
                .await;
                match attempt {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            "Encoder for {} exceeded {}s, killing it",
                            source.display(),
                            limit.as_secs()
                        );
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill encoder: {}", e);
                        }
                        return Err(EncodingError::TimedOut { limit });
                    }
                }
            }
            None => Self::pump_until_exit(&mut child, total_duration_secs, on_progress).await,
        };

        let (status, diagnostics) = pumped?;
        if !status.success() {
            let diagnostics = Vec::from(diagnostics).join("\n");
            return Err(EncodingError::ProcessFailed {
                status: status.to_string(),
                diagnostics,
            });
        }

        Ok(())
    }
}
