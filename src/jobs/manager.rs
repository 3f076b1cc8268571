use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{JobError, Result};
use super::models::{normalize_path, Job, JobEvent, JobFailure, JobId, JobSpec, JobStatus};
use super::store::JobStore;
use crate::clock::Clock;
use crate::observability::Metrics;

struct Entry {
    job: Job,
    cancel: CancellationToken,
}

/// Sole writer of job state
///
/// Every mutation is validated against the lifecycle
/// `PENDING -> PROCESSING -> {COMPLETED | FAILED}` (plus `PENDING -> FAILED`), written
/// through the [`JobStore`], and only then made visible to readers.
pub struct JobManager {
    entries: Mutex<BTreeMap<JobId, Entry>>,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

fn allowed(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Processing)
            | (JobStatus::Processing, JobStatus::Completed)
            | (JobStatus::Pending, JobStatus::Failed)
            | (JobStatus::Processing, JobStatus::Failed)
    )
}

fn elapsed_seconds(started_at: Option<DateTime<Utc>>, completed_at: DateTime<Utc>) -> Option<f64> {
    let started_at = started_at?;
    let millis = (completed_at - started_at).num_milliseconds().max(0);
    Some(millis as f64 / 1000.0)
}

impl JobManager {
    /// Manager with no history; jobs already in `store` are ignored
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            store,
            clock,
            metrics,
        }
    }

    /// Restore every job from `store`. Jobs left PENDING or PROCESSING by a previous
    /// process are failed with [`JobFailure::Interrupted`].
    pub fn open(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Result<Self> {
        let manager = Self::new(store, clock, metrics);
        let restored = manager.store.load_all()?;
        let now = manager.clock.now();
        let mut interrupted = 0usize;

        let mut entries = manager.lock();
        for mut job in restored {
            if !job.is_terminal() {
                warn!(job_id = %job.id, status = %job.status, "Marking unfinished job as interrupted");
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                job.duration_seconds = elapsed_seconds(job.started_at, now);
                job.error = Some(JobFailure::Interrupted);
                job.revision += 1;
                manager.store.upsert(&job)?;
                manager.record_event(&job, now, Some("interrupted".to_string()));
                interrupted += 1;
            }

            let cancel = CancellationToken::new();
            cancel.cancel();
            entries.insert(job.id, Entry { job, cancel });
        }
        info!(jobs = entries.len(), interrupted, "Job ledger restored");
        drop(entries);

        Ok(manager)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<JobId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_event(&self, job: &Job, at: DateTime<Utc>, note: Option<String>) {
        if let Err(e) = self.store.append_event(&JobEvent::for_job(job, at, note)) {
            warn!(job_id = %job.id, error = %e, "Failed to append job event");
        }
    }

    pub fn create(&self, spec: JobSpec) -> Result<Job> {
        let now = self.clock.now();
        let job = Job::new(Uuid::now_v7(), spec, now);

        self.store.upsert(&job)?;
        self.record_event(&job, now, None);
        self.lock().insert(
            job.id,
            Entry {
                job: job.clone(),
                cancel: CancellationToken::new(),
            },
        );
        self.metrics.job_created();

        info!(
            job_id = %job.id,
            kind = ?job.kind,
            source = %job.source,
            destination = %job.destination,
            "Job created"
        );
        Ok(job)
    }

    fn transition<F>(&self, id: JobId, to: JobStatus, note: Option<String>, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>),
    {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id).ok_or(JobError::NotFound(id))?;
        let from = entry.job.status;

        if !allowed(from, to) {
            warn!(job_id = %id, %from, %to, "Rejected job transition");
            return Err(JobError::InvalidTransition { id, from, to });
        }

        let now = self.clock.now();
        let mut next = entry.job.clone();
        next.status = to;
        apply(&mut next, now);
        next.revision += 1;

        self.store.upsert(&next)?;
        self.record_event(&next, now, note);
        entry.job = next.clone();

        if to.is_terminal() {
            entry.cancel.cancel();
        }
        drop(entries);

        info!(job_id = %id, %from, %to, "Job transition");
        Ok(next)
    }

    pub fn mark_processing(&self, id: JobId) -> Result<Job> {
        self.transition(id, JobStatus::Processing, None, |job, now| {
            job.started_at = Some(now);
        })
    }

    /// Only valid from PROCESSING; `output_path` is stored normalized
    pub fn mark_completed(&self, id: JobId, output_path: &Path) -> Result<Job> {
        let output_path = normalize_path(output_path);
        let job = self.transition(id, JobStatus::Completed, None, |job, now| {
            job.completed_at = Some(now);
            job.duration_seconds = elapsed_seconds(job.started_at, now);
            job.output_path = Some(output_path);
        })?;
        self.metrics.job_completed();
        Ok(job)
    }

    pub fn mark_failed(&self, id: JobId, failure: JobFailure) -> Result<Job> {
        let note = Some(failure.to_string());
        let job = self.transition(id, JobStatus::Failed, note, |job, now| {
            job.completed_at = Some(now);
            job.duration_seconds = elapsed_seconds(job.started_at, now);
            job.error = Some(failure);
        })?;
        self.metrics.job_failed();
        Ok(job)
    }

    /// Count one relocated output file against a PROCESSING job
    pub fn record_item(&self, id: JobId) -> Result<Job> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if entry.job.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                id,
                from: entry.job.status,
                to: JobStatus::Processing,
            });
        }

        let mut next = entry.job.clone();
        next.items_completed += 1;
        next.revision += 1;
        self.store.upsert(&next)?;
        entry.job = next.clone();
        Ok(next)
    }

    /// Operator cancellation: fail the job and stop its in-flight work
    pub fn abort(&self, id: JobId) -> Result<Job> {
        warn!(job_id = %id, "Aborting job");
        self.mark_failed(id, JobFailure::Aborted)
    }

    /// Abort every job that has not reached a terminal state
    pub fn abort_active(&self) -> Vec<JobId> {
        let active: Vec<JobId> = self
            .lock()
            .values()
            .filter(|e| !e.job.is_terminal())
            .map(|e| e.job.id)
            .collect();

        active
            .into_iter()
            .filter(|id| match self.abort(*id) {
                Ok(_) => true,
                // finished on its own between the scan and the abort
                Err(JobError::InvalidTransition { .. }) => false,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Failed to abort job");
                    false
                }
            })
            .collect()
    }

    /// Token cancelled once the job is terminal
    pub fn cancellation_token(&self, id: JobId) -> Result<CancellationToken> {
        self.lock()
            .get(&id)
            .map(|e| e.cancel.clone())
            .ok_or(JobError::NotFound(id))
    }

    pub fn get(&self, id: JobId) -> Result<Job> {
        self.lock()
            .get(&id)
            .map(|e| e.job.clone())
            .ok_or(JobError::NotFound(id))
    }

    /// All jobs, oldest first
    pub fn list(&self) -> Vec<Job> {
        self.lock().values().map(|e| e.job.clone()).collect()
    }

    pub fn events(&self, id: JobId) -> Result<Vec<JobEvent>> {
        Ok(self.store.events(id)?)
    }
}
