//! Fjall-based persistence for job records
//!
//! The ledger is the durable [`JobStore`](crate::jobs::JobStore) behind the job manager.
//! It keeps two partitions in one embedded LSM keyspace:
//!
//! - `jobs`: the latest record of every job, overwritten on each transition
//! - `events`: append-only transition history, keyed by job and revision
//!
//! Records are never deleted; inspecting the ledger after a crash or a NAS disconnect
//! shows exactly how far each job got.
//!
//! ```rust,ignore
//! use haulbox::ledger::FjallStore;
//!
//! let store = FjallStore::open("data/ledger")?;
//! let manager = JobManager::open(Arc::new(store), clock, metrics)?;
//! ```

pub mod error;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use store::{FjallStore, StoreStats};
