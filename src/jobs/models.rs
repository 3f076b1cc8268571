use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::engine::EngineFailureClass;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Single,
    Playlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured cause recorded on a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum JobFailure {
    /// Destination failed the write probe; nothing was transferred
    NotWritable { target: String },
    /// Credentials still rejected after every allowed refresh
    AuthExhausted { attempts: u32, detail: String },
    EngineFailure {
        class: EngineFailureClass,
        detail: String,
    },
    /// Engine output is intact in `temp_path` but could not be relocated
    MoveFailure {
        temp_path: String,
        destination: String,
        detail: String,
    },
    Credentials { profile: String, detail: String },
    /// Temp workspace could not be prepared or read
    Workspace { path: String, detail: String },
    /// Cancelled by the operator
    Aborted,
    /// Found unfinished when the ledger was reopened
    Interrupted,
}

impl JobFailure {
    /// Whether resubmitting the same request may succeed without operator action
    pub fn retryable(&self) -> bool {
        match self {
            JobFailure::EngineFailure { class, .. } => class.retryable(),
            JobFailure::Interrupted => true,
            JobFailure::NotWritable { .. }
            | JobFailure::AuthExhausted { .. }
            | JobFailure::MoveFailure { .. }
            | JobFailure::Credentials { .. }
            | JobFailure::Workspace { .. }
            | JobFailure::Aborted => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            JobFailure::NotWritable { .. } => "not_writable",
            JobFailure::AuthExhausted { .. } => "auth_exhausted",
            JobFailure::EngineFailure { .. } => "engine_failure",
            JobFailure::MoveFailure { .. } => "move_failure",
            JobFailure::Credentials { .. } => "credentials",
            JobFailure::Workspace { .. } => "workspace",
            JobFailure::Aborted => "aborted",
            JobFailure::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::NotWritable { target } => write!(f, "destination not writable: {}", target),
            JobFailure::AuthExhausted { attempts, detail } => {
                write!(f, "authentication failed after {} attempts: {}", attempts, detail)
            }
            JobFailure::EngineFailure { class, detail } => {
                write!(f, "engine failure ({:?}): {}", class, detail)
            }
            JobFailure::MoveFailure {
                temp_path,
                destination,
                detail,
            } => write!(
                f,
                "could not move {} to {}: {}",
                temp_path, destination, detail
            ),
            JobFailure::Credentials { profile, detail } => {
                write!(f, "credentials for '{}' unavailable: {}", profile, detail)
            }
            JobFailure::Workspace { path, detail } => {
                write!(f, "temp workspace {} unusable: {}", path, detail)
            }
            JobFailure::Aborted => f.write_str("aborted"),
            JobFailure::Interrupted => f.write_str("interrupted before completion"),
        }
    }
}

/// What to acquire and where it should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub source: String,
    pub destination: String,
}

impl JobSpec {
    pub fn new(kind: JobKind, source: impl Into<String>, destination: &Path) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: normalize_path(destination),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub source: String,
    pub destination: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub output_path: Option<String>,
    #[serde(default)]
    pub items_completed: u32,
    /// Bumped on every persisted change
    #[serde(default)]
    pub revision: u64,
    pub error: Option<JobFailure>,
}

impl Job {
    pub fn new(id: JobId, spec: JobSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: spec.kind,
            status: JobStatus::Pending,
            source: spec.source,
            destination: spec.destination,
            created_at,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            output_path: None,
            items_completed: 0,
            revision: 0,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One entry of a job's transition history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub revision: u64,
    pub status: JobStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl JobEvent {
    pub fn for_job(job: &Job, at: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            job_id: job.id,
            revision: job.revision,
            status: job.status,
            at,
            note,
        }
    }
}

/// Platform-neutral rendering used for every path stored on a job
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/srv/media/a.mp4")), "/srv/media/a.mp4");
        assert_eq!(normalize_path(Path::new(r"C:\media\a.mp4")), "C:/media/a.mp4");
    }

    #[test]
    fn test_failure_serializes_with_code_tag() {
        let failure = JobFailure::MoveFailure {
            temp_path: "/tmp/haulbox/1/a.mp4".to_string(),
            destination: "/mnt/nas/a.mp4".to_string(),
            detail: "disconnected".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["code"], "move_failure");
        assert_eq!(json["temp_path"], "/tmp/haulbox/1/a.mp4");

        let back: JobFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn test_failure_retryable() {
        assert!(!JobFailure::NotWritable {
            target: "/x".to_string()
        }
        .retryable());
        assert!(JobFailure::EngineFailure {
            class: EngineFailureClass::Network,
            detail: String::new(),
        }
        .retryable());
        assert!(!JobFailure::EngineFailure {
            class: EngineFailureClass::Unavailable,
            detail: String::new(),
        }
        .retryable());
        assert!(!JobFailure::Aborted.retryable());
    }

    #[test]
    fn test_job_json_shape() {
        let spec = JobSpec::new(JobKind::Single, "https://example.com/v", Path::new("/srv"));
        let job = Job::new(Uuid::now_v7(), spec, Utc::now());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["kind"], "single");
        assert!(json["duration_seconds"].is_null());
        assert!(json["started_at"].is_null());
    }
}
