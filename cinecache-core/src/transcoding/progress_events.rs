//! Parsing of the encoder's machine-readable progress channel.
//!
//! With `-progress pipe:2 -nostats` ffmpeg writes blocks of `key=value` lines
//! to stderr, each block closed by `progress=continue` or `progress=end`.
//! Anything else on stderr is a human-readable diagnostic.

use futures::Stream;
use futures::stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Keys ffmpeg emits inside a progress block that carry no timing information.
const STATUS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
];

/// Timing markers extracted from a progress block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Output timestamp reached by the encoder, in seconds
    OutTime { seconds: f64 },
    /// The encoder finished writing its output
    End,
}

/// One classified line of encoder output.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderLine {
    Event(ProgressEvent),
    /// Progress key without timing value (frame counters, bitrate, ...)
    Status,
    Diagnostic(String),
}

/// Classifies a single line written by the encoder.
///
/// `out_time_us` and `out_time_ms` both hold microseconds (the latter is
/// misnamed by ffmpeg). Negative and `N/A` timestamps, which ffmpeg emits
/// before the first packet is muxed, are reported as `Status`.
pub fn parse_encoder_line(line: &str) -> EncoderLine {
    let line = line.trim();
    let Some((key, value)) = line.split_once('=') else {
        return EncoderLine::Diagnostic(line.to_string());
    };
    let key = key.trim();
    let value = value.trim();

    match key {
        "out_time_us" | "out_time_ms" => match value.parse::<f64>() {
            Ok(micros) if micros.is_finite() && micros >= 0.0 => {
                EncoderLine::Event(ProgressEvent::OutTime {
                    seconds: micros / 1_000_000.0,
                })
            }
            _ => EncoderLine::Status,
        },
        "progress" if value == "end" => EncoderLine::Event(ProgressEvent::End),
        "progress" => EncoderLine::Status,
        _ if STATUS_KEYS.contains(&key) || key.starts_with("stream_") => EncoderLine::Status,
        _ => EncoderLine::Diagnostic(line.to_string()),
    }
}

/// Turns an encoder output channel into a lazy, finite stream of lines.
///
/// Lines are decoded lossily: container metadata echoed by the encoder is not
/// always UTF-8, and such a line must not hide the progress lines after it.
/// The stream ends at EOF. A read error also ends it, after a warning, because
/// the process exit status remains the authority on success.
pub fn encoder_lines<R>(reader: R) -> impl Stream<Item = EncoderLine>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold((reader, Vec::new()), |(mut reader, mut buf)| async move {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                let line = parse_encoder_line(&String::from_utf8_lossy(&buf));
                Some((line, (reader, buf)))
            }
            Err(e) => {
                warn!("Stopped reading encoder output: {}", e);
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn test_out_time_is_microseconds() {
        assert_eq!(
            parse_encoder_line("out_time_us=2500000"),
            EncoderLine::Event(ProgressEvent::OutTime { seconds: 2.5 })
        );
        assert_eq!(
            parse_encoder_line("out_time_ms=1000000"),
            EncoderLine::Event(ProgressEvent::OutTime { seconds: 1.0 })
        );
    }

    #[test]
    fn test_unusable_timestamps_are_status() {
        assert_eq!(parse_encoder_line("out_time_us=N/A"), EncoderLine::Status);
        assert_eq!(parse_encoder_line("out_time_ms=-23220"), EncoderLine::Status);
    }

    #[test]
    fn test_block_terminators() {
        assert_eq!(parse_encoder_line("progress=continue"), EncoderLine::Status);
        assert_eq!(
            parse_encoder_line("progress=end"),
            EncoderLine::Event(ProgressEvent::End)
        );
    }

    #[test]
    fn test_diagnostics_are_kept_verbatim() {
        assert_eq!(parse_encoder_line("stream_0_0_q=-1.0"), EncoderLine::Status);
        assert_eq!(parse_encoder_line("speed=1.5x"), EncoderLine::Status);
        assert_eq!(
            parse_encoder_line("input.mkv: No such file or directory"),
            EncoderLine::Diagnostic("input.mkv: No such file or directory".to_string())
        );
        assert_eq!(
            parse_encoder_line("Unknown encoder 'aac_at'"),
            EncoderLine::Diagnostic("Unknown encoder 'aac_at'".to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_yields_lines_in_order() {
        let output = b"frame=10\nout_time_us=500000\nprogress=continue\n\
                       out_time_us=1000000\nprogress=end\n";
        let lines: Vec<EncoderLine> = encoder_lines(&output[..]).collect().await;

        let events: Vec<ProgressEvent> = lines
            .into_iter()
            .filter_map(|line| match line {
                EncoderLine::Event(event) => Some(event),
                _ => None,
            })
            .collect();

        assert_eq!(
            events,
            vec![
                ProgressEvent::OutTime { seconds: 0.5 },
                ProgressEvent::OutTime { seconds: 1.0 },
                ProgressEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let reader = tokio_test::io::Builder::new()
            .read(b"out_time_us=3000000\nprogress=contin")
            .read_error(std::io::Error::other("pipe closed"))
            .build();
        let lines: Vec<EncoderLine> = encoder_lines(tokio::io::BufReader::new(reader))
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![EncoderLine::Event(ProgressEvent::OutTime { seconds: 3.0 })]
        );
    }

    #[tokio::test]
    async fn test_non_utf8_line_does_not_stop_progress() {
        let output: &[u8] = b"out_time_us=1000000\n  title : \xe9t\xe9\n\
                              out_time_us=2000000\nout_time_us=3000000\nprogress=end\n";
        let lines: Vec<EncoderLine> = encoder_lines(output).collect().await;

        let events: Vec<ProgressEvent> = lines
            .iter()
            .filter_map(|line| match line {
                EncoderLine::Event(event) => Some(*event),
                _ => None,
            })
            .collect();
        assert_eq!(
            events,
            vec![
                ProgressEvent::OutTime { seconds: 1.0 },
                ProgressEvent::OutTime { seconds: 2.0 },
                ProgressEvent::OutTime { seconds: 3.0 },
                ProgressEvent::End,
            ]
        );
        let decoded = EncoderLine::Diagnostic("title : \u{fffd}t\u{fffd}".to_string());
        assert!(lines.contains(&decoded));
    }
}
