//! In-process counters for job outcomes, credential churn and relocations

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    credential_extractions: AtomicU64,
    auth_refreshes: AtomicU64,
    local_moves: AtomicU64,
    remote_moves: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_created", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn credential_extracted(&self) {
        self.credential_extractions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "credential_extractions", "Metric incremented");
    }

    pub fn auth_refreshed(&self) {
        self.auth_refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "auth_refreshes", "Metric incremented");
    }

    pub fn file_moved(&self, remote: bool) {
        let (counter, name) = if remote {
            (&self.remote_moves, "remote_moves")
        } else {
            (&self.local_moves, "local_moves")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            credential_extractions: self.credential_extractions.load(Ordering::Relaxed),
            auth_refreshes: self.auth_refreshes.load(Ordering::Relaxed),
            local_moves: self.local_moves.load(Ordering::Relaxed),
            remote_moves: self.remote_moves.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub credential_extractions: u64,
    pub auth_refreshes: u64,
    pub local_moves: u64,
    pub remote_moves: u64,
}
