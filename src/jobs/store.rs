use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::models::{Job, JobEvent, JobId};
use crate::ledger::Result;

/// Durable home for job records. The [`JobManager`](super::JobManager) is its only writer.
pub trait JobStore: Send + Sync {
    /// Insert or replace the current record for `job.id`
    fn upsert(&self, job: &Job) -> Result<()>;

    fn append_event(&self, event: &JobEvent) -> Result<()>;

    fn load_all(&self) -> Result<Vec<Job>>;

    /// Transition history for one job, oldest first
    fn events(&self, job_id: JobId) -> Result<Vec<JobEvent>>;
}

/// Store that lives and dies with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<BTreeMap<JobId, Job>>,
    events: Mutex<Vec<JobEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn upsert(&self, job: &Job) -> Result<()> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id, job.clone());
        Ok(())
    }

    fn append_event(&self, event: &JobEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.values().cloned().collect())
    }

    fn events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().filter(|e| e.job_id == job_id).cloned().collect())
    }
}
