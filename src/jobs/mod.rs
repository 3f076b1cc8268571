//! Job lifecycle tracking
//!
//! A [`Job`] records one acquisition from enqueue to a terminal state. Only the
//! [`JobManager`] mutates jobs; everything else reads snapshots.

pub mod error;
pub mod manager;
pub mod models;
pub mod store;

pub use error::{JobError, Result};
pub use manager::JobManager;
pub use models::{
    normalize_path, Job, JobEvent, JobFailure, JobId, JobKind, JobSpec, JobStatus,
};
pub use store::{JobStore, MemoryStore};
