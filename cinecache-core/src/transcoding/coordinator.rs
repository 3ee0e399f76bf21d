//! Single-flight transcode cache.
//!
//! At most one encoder run exists per identifier. The first caller registers a
//! run handle and spawns the work on its own task; every later caller for the
//! same identifier subscribes to that handle's completion channel and receives
//! the identical outcome. The spawned task owns the work, so a viewer that
//! disconnects never cancels a transcode other viewers are waiting on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

use super::encoder::{Encoder, ProgressSample};
use super::probe::DurationProbe;
use super::tracker::ProgressTracker;
use super::{TranscodeError, TranscodeResult};
use crate::source_id::SourceId;
use crate::storage::ArtifactStore;

type RunOutcome = TranscodeResult<PathBuf>;

/// Shared in-flight representation of one encoder run.
struct RunHandle {
    run_id: u64,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

/// Result of attaching to an identifier without waiting.
#[derive(Debug)]
pub enum RunAttachment {
    /// Artifact already exists; no run needed
    Ready(PathBuf),
    /// A run is in flight; await it with [`TranscodeCoordinator::await_run`]
    Running(RunSubscription),
}

/// Subscription to the completion of one run.
#[derive(Debug)]
pub struct RunSubscription {
    outcome: watch::Receiver<Option<RunOutcome>>,
}

struct CoordinatorInner {
    store: ArtifactStore,
    tracker: ProgressTracker,
    probe: Arc<dyn DurationProbe>,
    encoder: Arc<dyn Encoder>,
    runs: Mutex<HashMap<SourceId, RunHandle>>,
    run_counter: AtomicU64,
    permits: Semaphore,
}

/// Converts sources into ready artifacts, at most once per identifier.
#[derive(Clone)]
pub struct TranscodeCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TranscodeCoordinator {
    /// Creates a coordinator; `max_concurrent` bounds encoder processes
    /// across different identifiers.
    pub fn new(
        store: ArtifactStore,
        tracker: ProgressTracker,
        probe: Arc<dyn DurationProbe>,
        encoder: Arc<dyn Encoder>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                tracker,
                probe,
                encoder,
                runs: Mutex::new(HashMap::new()),
                run_counter: AtomicU64::new(1),
                permits: Semaphore::new(max_concurrent.max(1)),
            }),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.inner.tracker
    }

    /// Returns the path of a ready artifact, transcoding first if needed.
    ///
    /// Concurrent callers for the same identifier share one encoder run.
    ///
    /// # Errors
    /// - `TranscodeError::SourceMissing` - Neither artifact nor source exists
    /// - `TranscodeError::EncodingFailed` - The shared run failed
    pub async fn ensure_ready(&self, id: &SourceId) -> TranscodeResult<PathBuf> {
        match self.attach(id).await? {
            RunAttachment::Ready(path) => Ok(path),
            RunAttachment::Running(subscription) => Self::await_run(subscription).await,
        }
    }

    /// Starts or joins the run for `id` without waiting for it.
    ///
    /// # Errors
    /// - `TranscodeError::SourceMissing` - Neither artifact nor source exists
    pub async fn start_background(&self, id: &SourceId) -> TranscodeResult<RunAttachment> {
        self.attach(id).await
    }

    /// Whether a run for `id` is currently registered.
    pub fn is_running(&self, id: &SourceId) -> bool {
        self.inner.runs.lock().contains_key(id)
    }

    /// Waits for a run to publish its outcome.
    ///
    /// # Errors
    /// - `TranscodeError::EncodingFailed` - The run failed or was aborted
    /// - `TranscodeError::SourceMissing` - The source vanished before the run started
    pub async fn await_run(mut subscription: RunSubscription) -> TranscodeResult<PathBuf> {
        match subscription.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or_else(|| Err(run_aborted())),
            Err(_) => Err(run_aborted()),
        }
    }

    async fn attach(&self, id: &SourceId) -> TranscodeResult<RunAttachment> {
        if let Some(subscription) = self.subscribe(id) {
            debug!("Joining in-flight run for {}", id);
            return Ok(RunAttachment::Running(subscription));
        }

        if let Some(path) = self.inner.store.find_ready(id).await {
            debug!("Artifact ready for {}: {}", id, path.display());
            // Artifacts outlive the in-memory table across restarts
            self.inner.tracker.ensure_done(id);
            return Ok(RunAttachment::Ready(path));
        }

        if self.inner.store.find_source(id).await.is_none() {
            // A run may have promoted its artifact and removed the source meanwhile
            if let Some(path) = self.inner.store.find_ready(id).await {
                return Ok(RunAttachment::Ready(path));
            }
            return Err(TranscodeError::SourceMissing {
                source_id: id.clone(),
            });
        }

        Ok(RunAttachment::Running(self.register_or_join(id)))
    }

    fn subscribe(&self, id: &SourceId) -> Option<RunSubscription> {
        self.inner
            .runs
            .lock()
            .get(id)
            .map(|handle| RunSubscription {
                outcome: handle.outcome.clone(),
            })
    }

    /// Registers a new run unless another caller won the race to do so.
    fn register_or_join(&self, id: &SourceId) -> RunSubscription {
        let mut runs = self.inner.runs.lock();
        if let Some(handle) = runs.get(id) {
            debug!("Joining run registered concurrently for {}", id);
            return RunSubscription {
                outcome: handle.outcome.clone(),
            };
        }

        let run_id = self.inner.run_counter.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = watch::channel(None);
        runs.insert(
            id.clone(),
            RunHandle {
                run_id,
                outcome: receiver.clone(),
            },
        );
        self.inner.tracker.start(id);
        info!("Registered transcode run {} for {}", run_id, id);

        let inner = Arc::clone(&self.inner);
        let key = id.clone();
        tokio::spawn(async move {
            let guard = RunGuard {
                inner: Arc::clone(&inner),
                id: key.clone(),
                run_id,
                finished: false,
            };
            let outcome = inner.execute(&key).await;
            guard.finish();
            sender.send_replace(Some(outcome));
        });

        RunSubscription { outcome: receiver }
    }
}

impl CoordinatorInner {
    async fn execute(&self, id: &SourceId) -> RunOutcome {
        if let Some(path) = self.store.find_ready(id).await {
            // Another run promoted the artifact between registry check and now
            debug!("Artifact for {} appeared before encoding, reusing it", id);
            self.tracker.ensure_done(id);
            return Ok(path);
        }

        let Some(source) = self.store.find_source(id).await else {
            let error = TranscodeError::SourceMissing {
                source_id: id.clone(),
            };
            self.tracker.mark_failed(id, error.to_string());
            return Err(error);
        };

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let error = TranscodeError::EncodingFailed {
                    reason: "transcode permits closed".to_string(),
                };
                self.tracker.mark_failed(id, error.to_string());
                return Err(error);
            }
        };

        let total_duration = match self.tracker.known_duration(id) {
            Some(seconds) => seconds,
            None => {
                let seconds = self.probe.probe(&source).await;
                self.tracker.record_duration(id, seconds);
                seconds
            }
        };

        let partial = self.store.partial_path(id);
        let target = self.store.artifact_path(id);
        let tracker = self.tracker.clone();
        let progress_key = id.clone();
        let on_progress = move |sample: ProgressSample| {
            tracker.update_progress(&progress_key, sample.percent, sample.eta_seconds);
        };

        info!(
            "Transcoding {} ({:.1}s) -> {}",
            source.display(),
            total_duration,
            target.display()
        );

        if let Err(e) = self
            .encoder
            .run(&source, &partial, total_duration, &on_progress)
            .await
        {
            self.discard_partial(&partial).await;
            error!("Transcode failed for {}: {}", id, e);
            self.tracker.mark_failed(id, e.to_string());
            return Err(TranscodeError::EncodingFailed {
                reason: e.to_string(),
            });
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            self.discard_partial(&partial).await;
            let reason = format!("promoting {}: {e}", partial.display());
            error!("Transcode failed for {}: {}", id, reason);
            self.tracker.mark_failed(id, reason.clone());
            return Err(TranscodeError::EncodingFailed { reason });
        }

        self.tracker.mark_done(id);

        match self.store.delete_source(id).await {
            Ok(true) => info!("Removed source {} after transcode", source.display()),
            Ok(false) => {}
            Err(e) => warn!("Artifact ready but source cleanup failed: {}", e),
        }

        info!("Transcode complete for {}: {}", id, target.display());
        Ok(target)
    }

    async fn discard_partial(&self, partial: &std::path::Path) {
        match tokio::fs::remove_file(partial).await {
            Ok(()) => debug!("Discarded partial artifact {}", partial.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to discard partial artifact {}: {}",
                partial.display(),
                e
            ),
        }
    }
}

/// Releases the registry entry of a run, including when the run panics.
struct RunGuard {
    inner: Arc<CoordinatorInner>,
    id: SourceId,
    run_id: u64,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        {
            let mut runs = self.inner.runs.lock();
            if runs.get(&self.id).is_some_and(|h| h.run_id == self.run_id) {
                runs.remove(&self.id);
            }
        }
        if !self.finished {
            warn!("Transcode run {} for {} aborted", self.run_id, self.id);
            self.inner
                .tracker
                .mark_failed(&self.id, run_aborted().to_string());
        }
    }
}

fn run_aborted() -> TranscodeError {
    TranscodeError::EncodingFailed {
        reason: "run aborted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;
    use tempfile::TempDir;
    use tokio::fs;

    use super::*;
    use crate::config::CinecacheConfig;
    use crate::transcoding::JobStatus;
    use crate::transcoding::testing::{FixedDurationProbe, ScriptedEncoder};

    struct Fixture {
        _dir: TempDir,
        coordinator: TranscodeCoordinator,
        encoder: Arc<ScriptedEncoder>,
        probe: Arc<FixedDurationProbe>,
    }

    async fn fixture(encoder: ScriptedEncoder) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = CinecacheConfig::for_testing(dir.path());
        let store = ArtifactStore::new(&config.storage);
        store.ensure_dirs().await.unwrap();

        let encoder = Arc::new(encoder);
        let probe = Arc::new(FixedDurationProbe::new(120.0));
        let coordinator = TranscodeCoordinator::new(
            store,
            ProgressTracker::new(),
            probe.clone(),
            encoder.clone(),
            2,
        );
        Fixture {
            _dir: dir,
            coordinator,
            encoder,
            probe,
        }
    }

    async fn add_source(coordinator: &TranscodeCoordinator, name: &str) -> SourceId {
        let id = SourceId::parse(name).unwrap();
        fs::write(coordinator.store().source_path(&id), b"matroska")
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let encoder =
            ScriptedEncoder::new(b"mp4 bytes".to_vec()).with_delay(Duration::from_millis(50));
        let fx = fixture(encoder).await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        let calls = (0..16).map(|_| {
            let coordinator = fx.coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move { coordinator.ensure_ready(&id).await })
        });
        let results = join_all(calls).await;

        let expected = fx.coordinator.store().artifact_path(&id);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), expected);
        }
        assert_eq!(fx.encoder.invocations(), 1);
        assert_eq!(fx.probe.calls(), 1);
        assert_eq!(fs::read(&expected).await.unwrap(), b"mp4 bytes");
        assert!(!fx.coordinator.is_running(&id));
    }

    #[tokio::test]
    async fn test_ready_artifact_never_respawns() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        let first = fx.coordinator.ensure_ready(&id).await.unwrap();
        for _ in 0..5 {
            assert_eq!(fx.coordinator.ensure_ready(&id).await.unwrap(), first);
        }
        assert_eq!(fx.encoder.invocations(), 1);
        assert_eq!(fx.coordinator.tracker().status(&id), JobStatus::Done);
    }

    #[tokio::test]
    async fn test_success_deletes_source() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        fx.coordinator.ensure_ready(&id).await.unwrap();

        assert!(fx.coordinator.store().find_source(&id).await.is_none());
        assert!(!fx.coordinator.store().partial_path(&id).exists());
    }

    #[tokio::test]
    async fn test_failure_keeps_source_and_reaches_every_waiter() {
        let gate = Arc::new(Semaphore::new(0));
        let fx = fixture(
            ScriptedEncoder::new(b"mp4".to_vec())
                .gated(gate.clone())
                .failing_first(1),
        )
        .await;
        let id = add_source(&fx.coordinator, "broken.avi").await;

        let mut subscriptions = Vec::new();
        for _ in 0..4 {
            match fx.coordinator.start_background(&id).await.unwrap() {
                RunAttachment::Running(subscription) => subscriptions.push(subscription),
                RunAttachment::Ready(path) => panic!("unexpected artifact {}", path.display()),
            }
        }
        assert!(fx.coordinator.is_running(&id));
        gate.add_permits(1);

        let outcomes =
            join_all(subscriptions.into_iter().map(TranscodeCoordinator::await_run)).await;
        for outcome in outcomes {
            assert!(matches!(outcome, Err(TranscodeError::EncodingFailed { .. })));
        }
        assert_eq!(fx.encoder.invocations(), 1);
        assert!(fx.coordinator.store().find_source(&id).await.is_some());
        assert!(fx.coordinator.store().find_ready(&id).await.is_none());
        assert!(!fx.coordinator.store().partial_path(&id).exists());

        let job = fx.coordinator.tracker().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_failed_run_can_be_retried() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec()).failing_first(1)).await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        assert!(fx.coordinator.ensure_ready(&id).await.is_err());
        let path = fx.coordinator.ensure_ready(&id).await.unwrap();

        assert_eq!(path, fx.coordinator.store().artifact_path(&id));
        assert_eq!(fx.encoder.invocations(), 2);
        // Duration is probed once per identifier
        assert_eq!(fx.probe.calls(), 1);
        assert_eq!(fx.coordinator.tracker().status(&id), JobStatus::Done);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let id = SourceId::parse("ghost.mkv").unwrap();

        let result = fx.coordinator.ensure_ready(&id).await;
        assert_eq!(
            result,
            Err(TranscodeError::SourceMissing {
                source_id: id.clone()
            })
        );
        assert_eq!(fx.encoder.invocations(), 0);
        assert_eq!(fx.coordinator.tracker().report(&id).status, "not_found");
    }

    #[tokio::test]
    async fn test_existing_artifact_without_job_is_ready() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec())).await;
        let id = SourceId::parse("kept.mkv").unwrap();
        let artifact = fx.coordinator.store().artifact_path(&id);
        fs::write(&artifact, b"from a previous process").await.unwrap();

        assert_eq!(fx.coordinator.ensure_ready(&id).await.unwrap(), artifact);
        assert_eq!(fx.encoder.invocations(), 0);
        assert_eq!(fx.coordinator.tracker().report(&id).status, "done");
    }

    #[tokio::test]
    async fn test_progress_visible_while_running() {
        let gate = Arc::new(Semaphore::new(0));
        let fx = fixture(
            ScriptedEncoder::new(b"mp4".to_vec())
                .with_progress(&[(10.0, 90.0), (35.0, 60.0), (30.0, 70.0)])
                .gated(gate.clone()),
        )
        .await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        let attachment = fx.coordinator.start_background(&id).await.unwrap();
        let RunAttachment::Running(subscription) = attachment else {
            panic!("expected a running attachment");
        };

        let mut percents = Vec::new();
        loop {
            let report = fx.coordinator.tracker().report(&id);
            assert_eq!(report.status, "in_progress");
            percents.push(report.percent);
            if report.percent >= 35.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        gate.add_permits(1);
        TranscodeCoordinator::await_run(subscription).await.unwrap();

        let report = fx.coordinator.tracker().report(&id);
        assert_eq!(report.percent, 100.0);
        assert_eq!(report.eta, 0.0);
        assert_eq!(report.status, "done");
    }

    #[tokio::test]
    async fn test_panicking_run_releases_handle() {
        let fx = fixture(ScriptedEncoder::new(b"mp4".to_vec()).panicking()).await;
        let id = add_source(&fx.coordinator, "movie.mkv").await;

        let result = fx.coordinator.ensure_ready(&id).await;
        assert_eq!(result, Err(run_aborted()));
        assert!(!fx.coordinator.is_running(&id));
        assert_eq!(fx.coordinator.tracker().status(&id), JobStatus::Error);
        assert!(fx.coordinator.store().find_source(&id).await.is_some());
    }
}
