//! Deterministic encoder and probe doubles for tests.
//!
//! Available to other crates through the `test-utils` feature.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::encoder::{Encoder, EncodingError, ProgressSample};
use super::probe::DurationProbe;

/// Probe returning a fixed duration and counting calls.
#[derive(Debug, Default)]
pub struct FixedDurationProbe {
    seconds: f64,
    calls: AtomicUsize,
}

impl FixedDurationProbe {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurationProbe for FixedDurationProbe {
    async fn probe(&self, _source: &Path) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seconds
    }
}

/// Encoder that writes a fixed payload instead of running a process.
///
/// Emits the configured progress samples, optionally waits on a gate so tests
/// can hold a run open, and can be told to fail or panic.
#[derive(Debug)]
pub struct ScriptedEncoder {
    payload: Vec<u8>,
    progress: Vec<ProgressSample>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    failures_remaining: AtomicUsize,
    panics: bool,
    invocations: AtomicUsize,
}

impl ScriptedEncoder {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            progress: Vec::new(),
            delay: Duration::ZERO,
            gate: None,
            failures_remaining: AtomicUsize::new(0),
            panics: false,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Progress samples emitted, in order, before the run finishes.
    pub fn with_progress(mut self, steps: &[(f64, f64)]) -> Self {
        self.progress = steps
            .iter()
            .map(|&(percent, eta_seconds)| ProgressSample {
                percent,
                eta_seconds,
            })
            .collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each run consumes one permit from `gate` after emitting progress.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The first `runs` invocations exit with an error after writing garbage.
    pub fn failing_first(self, runs: usize) -> Self {
        self.failures_remaining.store(runs, Ordering::SeqCst);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn run(
        &self,
        _source: &Path,
        target: &Path,
        _total_duration_secs: f64,
        on_progress: &(dyn Fn(ProgressSample) + Send + Sync),
    ) -> Result<(), EncodingError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        for sample in &self.progress {
            on_progress(*sample);
            tokio::task::yield_now().await;
        }

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| EncodingError::Io {
                reason: e.to_string(),
            })?;
            permit.forget();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.panics {
            panic!("scripted encoder panic");
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            tokio::fs::write(target, b"truncated")
                .await
                .map_err(|e| EncodingError::Io {
                    reason: e.to_string(),
                })?;
            return Err(EncodingError::ProcessFailed {
                status: "exit status: 1".to_string(),
                diagnostics: "scripted failure".to_string(),
            });
        }

        tokio::fs::write(target, &self.payload)
            .await
            .map_err(|e| EncodingError::Io {
                reason: e.to_string(),
            })
    }
}
