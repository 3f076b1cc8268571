use thiserror::Error;

use super::models::{JobId, JobStatus};
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job store error: {0}")]
    Store(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, JobError>;
