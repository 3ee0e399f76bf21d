//! Process-wide table of transcode jobs, polled by viewers.
//!
//! Constructed once and shared by handle. Each identifier is written only by
//! its single active run, so per-key updates never race; the lock only guards
//! the map itself and is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::source_id::SourceId;

/// Lifecycle of one identifier's transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    InProgress,
    Done,
    Error,
}

impl JobStatus {
    /// Wire name used by the progress endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

/// Live state of one transcode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub status: JobStatus,
    /// Within `[0, 100]`, non-decreasing while in progress
    pub percent_complete: f64,
    /// Zero unless in progress with a known speed
    pub estimated_seconds_remaining: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Probed once per identifier and reused by retries
    pub total_duration_seconds: Option<f64>,
    /// Reason of the most recent failure
    pub error: Option<String>,
}

impl Job {
    fn idle() -> Self {
        Self {
            status: JobStatus::Idle,
            percent_complete: 0.0,
            estimated_seconds_remaining: 0.0,
            started_at: None,
            finished_at: None,
            total_duration_seconds: None,
            error: None,
        }
    }
}

/// Body of the progress endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub percent: f64,
    pub eta: f64,
    pub status: &'static str,
}

impl ProgressReport {
    /// Report for an identifier the tracker has never seen.
    pub fn not_found() -> Self {
        Self {
            percent: 0.0,
            eta: 0.0,
            status: "not_found",
        }
    }
}

impl From<&Job> for ProgressReport {
    fn from(job: &Job) -> Self {
        Self {
            percent: job.percent_complete,
            eta: job.estimated_seconds_remaining,
            status: job.status.as_str(),
        }
    }
}

/// Concurrent map from source identifier to its job.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    jobs: Arc<RwLock<HashMap<SourceId, Job>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SourceId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    /// Progress as served to pollers; unknown identifiers report `not_found`.
    pub fn report(&self, id: &SourceId) -> ProgressReport {
        self.jobs
            .read()
            .get(id)
            .map(ProgressReport::from)
            .unwrap_or_else(ProgressReport::not_found)
    }

    pub fn status(&self, id: &SourceId) -> JobStatus {
        self.jobs
            .read()
            .get(id)
            .map(|job| job.status)
            .unwrap_or(JobStatus::Idle)
    }

    /// Duration recorded by an earlier run, if any.
    pub fn known_duration(&self, id: &SourceId) -> Option<f64> {
        self.jobs
            .read()
            .get(id)
            .and_then(|job| job.total_duration_seconds)
    }

    /// Moves the job to `InProgress` with zeroed progress.
    ///
    /// A recorded duration survives so retries do not probe again.
    pub fn start(&self, id: &SourceId) {
        let mut jobs = self.jobs.write();
        let job = jobs.entry(id.clone()).or_insert_with(Job::idle);
        job.status = JobStatus::InProgress;
        job.percent_complete = 0.0;
        job.estimated_seconds_remaining = 0.0;
        job.started_at = Some(Utc::now());
        job.finished_at = None;
        job.error = None;
    }

    /// Records the probed duration unless one is already known.
    pub fn record_duration(&self, id: &SourceId, seconds: f64) {
        if let Some(job) = self.jobs.write().get_mut(id) {
            if job.total_duration_seconds.is_none() {
                job.total_duration_seconds = Some(seconds);
            }
        }
    }

    /// Applies an encoder progress sample.
    ///
    /// Ignored unless the job is in progress. Percent is max-merged so pollers
    /// never observe it going backwards.
    pub fn update_progress(&self, id: &SourceId, percent: f64, eta_seconds: f64) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(id) else {
            return;
        };
        if job.status != JobStatus::InProgress {
            return;
        }
        if percent.is_finite() {
            job.percent_complete = job.percent_complete.max(percent.clamp(0.0, 100.0));
        }
        job.estimated_seconds_remaining = if eta_seconds.is_finite() {
            eta_seconds.max(0.0)
        } else {
            0.0
        };
    }

    pub fn mark_done(&self, id: &SourceId) {
        let mut jobs = self.jobs.write();
        let job = jobs.entry(id.clone()).or_insert_with(Job::idle);
        job.status = JobStatus::Done;
        job.percent_complete = 100.0;
        job.estimated_seconds_remaining = 0.0;
        job.finished_at = Some(Utc::now());
        job.error = None;
    }

    /// Marks a job done only if it is not already, leaving timestamps intact.
    pub fn ensure_done(&self, id: &SourceId) {
        if self.status(id) != JobStatus::Done {
            self.mark_done(id);
        }
    }

    pub fn mark_failed(&self, id: &SourceId, reason: impl Into<String>) {
        let mut jobs = self.jobs.write();
        let job = jobs.entry(id.clone()).or_insert_with(Job::idle);
        job.status = JobStatus::Error;
        job.estimated_seconds_remaining = 0.0;
        job.finished_at = Some(Utc::now());
        job.error = Some(reason.into());
    }

    /// Copy of every job, sorted by identifier.
    pub fn snapshot(&self) -> Vec<(SourceId, Job)> {
        let mut jobs: Vec<(SourceId, Job)> = self
            .jobs
            .read()
            .iter()
            .map(|(id, job)| (id.clone(), job.clone()))
            .collect();
        jobs.sort_by(|a, b| a.0.cmp(&b.0));
        jobs
    }
}
