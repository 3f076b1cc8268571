use std::path::PathBuf;
use thiserror::Error;

use crate::jobs::JobId;

/// Failures reading or writing the job ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Cannot create ledger directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {record} for job {job_id}: {source}")]
    Encode {
        record: &'static str,
        job_id: JobId,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value no longer decodes, e.g. written by an incompatible version
    #[error("Corrupt {record} record at '{key}': {source}")]
    Corrupt {
        record: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unrecognised key '{key}' in {partition} partition")]
    InvalidKey { partition: &'static str, key: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
