use std::path::PathBuf;
use thiserror::Error;

use crate::auth::RetryError;
use crate::credentials::CredentialError;
use crate::engine::{EngineError, EngineFailureClass};
use crate::jobs::{normalize_path, JobError, JobFailure, JobId};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("job {job_id}: destination {} is not writable", .target.display())]
    NotWritable { job_id: JobId, target: PathBuf },

    #[error("job {job_id}: authentication failed after {attempts} attempts: {last}")]
    AuthExhausted {
        job_id: JobId,
        attempts: u32,
        last: EngineError,
    },

    #[error("job {job_id}: engine failure ({class:?}): {source}")]
    EngineFailure {
        job_id: JobId,
        class: EngineFailureClass,
        #[source]
        source: EngineError,
    },

    #[error(
        "job {job_id}: could not move {} to {}: {source}",
        .temp_path.display(),
        .destination.display()
    )]
    MoveFailure {
        job_id: JobId,
        temp_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("job {job_id}: credentials for profile '{profile}' unavailable: {source}")]
    Credentials {
        job_id: JobId,
        profile: String,
        #[source]
        source: CredentialError,
    },

    #[error("job {job_id}: aborted")]
    Aborted { job_id: JobId },

    #[error("job {job_id}: temp workspace {}: {source}", .path.display())]
    Workspace {
        job_id: JobId,
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("batch worker failed: {0}")]
    Worker(String),
}

impl AcquireError {
    pub(crate) fn from_retry(job_id: JobId, profile: Option<&str>, err: RetryError) -> Self {
        match err {
            RetryError::AuthExhausted { attempts, last } => AcquireError::AuthExhausted {
                job_id,
                attempts,
                last,
            },
            RetryError::Fatal {
                class: EngineFailureClass::Cancelled,
                ..
            } => AcquireError::Aborted { job_id },
            RetryError::Fatal { class, error } => AcquireError::EngineFailure {
                job_id,
                class,
                source: error,
            },
            RetryError::Credential(source) => AcquireError::Credentials {
                job_id,
                profile: profile.unwrap_or_default().to_string(),
                source,
            },
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            AcquireError::NotWritable { job_id, .. }
            | AcquireError::AuthExhausted { job_id, .. }
            | AcquireError::EngineFailure { job_id, .. }
            | AcquireError::MoveFailure { job_id, .. }
            | AcquireError::Credentials { job_id, .. }
            | AcquireError::Aborted { job_id }
            | AcquireError::Workspace { job_id, .. } => Some(*job_id),
            AcquireError::Job(JobError::NotFound(id))
            | AcquireError::Job(JobError::InvalidTransition { id, .. }) => Some(*id),
            AcquireError::Job(JobError::Store(_)) | AcquireError::Worker(_) => None,
        }
    }

    /// Structured cause to record on the job, if this error belongs on one
    pub fn failure(&self) -> Option<JobFailure> {
        let failure = match self {
            AcquireError::NotWritable { target, .. } => JobFailure::NotWritable {
                target: normalize_path(target),
            },
            AcquireError::AuthExhausted { attempts, last, .. } => JobFailure::AuthExhausted {
                attempts: *attempts,
                detail: last.message.clone(),
            },
            AcquireError::EngineFailure { class, source, .. } => JobFailure::EngineFailure {
                class: *class,
                detail: source.message.clone(),
            },
            AcquireError::MoveFailure {
                temp_path,
                destination,
                source,
                ..
            } => JobFailure::MoveFailure {
                temp_path: normalize_path(temp_path),
                destination: normalize_path(destination),
                detail: source.to_string(),
            },
            AcquireError::Credentials {
                profile, source, ..
            } => JobFailure::Credentials {
                profile: profile.clone(),
                detail: source.to_string(),
            },
            AcquireError::Workspace { path, source, .. } => JobFailure::Workspace {
                path: normalize_path(path),
                detail: source.to_string(),
            },
            AcquireError::Aborted { .. } => JobFailure::Aborted,
            AcquireError::Job(_) | AcquireError::Worker(_) => return None,
        };
        Some(failure)
    }

    pub fn retryable(&self) -> bool {
        self.failure().is_some_and(|f| f.retryable())
    }
}
