use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{LedgerError, Result};
use super::partitions::{decode_job_key, encode_event_key, encode_event_prefix, encode_job_key};
use crate::jobs::{Job, JobEvent, JobId, JobStore};

/// Fjall-backed persistent storage for job records and their transition history
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    events: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let events = keyspace.open_partition("events", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            jobs,
            events,
        })
    }

    /// Get a single job record by ID
    pub fn get(&self, job_id: JobId) -> Result<Option<Job>> {
        let key = encode_job_key(&job_id.to_string());
        match self.jobs.get(&key)? {
            Some(value) => Ok(Some(decode("job", &key, &value)?)),
            None => Ok(None),
        }
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let mut job_count = 0;
        let mut event_count = 0;

        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }

        for item in self.events.iter() {
            item?;
            event_count += 1;
        }

        Ok(StoreStats {
            job_count,
            event_count,
        })
    }
}

impl JobStore for FjallStore {
    fn upsert(&self, job: &Job) -> Result<()> {
        let key = encode_job_key(&job.id.to_string());
        let value = serde_json::to_vec(job).map_err(|source| LedgerError::Encode {
            record: "job",
            job_id: job.id,
            source,
        })?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.id, revision = job.revision, "Upserted job");
        Ok(())
    }

    fn append_event(&self, event: &JobEvent) -> Result<()> {
        let key = encode_event_key(&event.job_id.to_string(), event.revision);
        let value = serde_json::to_vec(event).map_err(|source| LedgerError::Encode {
            record: "event",
            job_id: event.job_id,
            source,
        })?;
        self.events.insert(key, value)?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for item in self.jobs.iter() {
            let (key, value) = item?;
            if decode_job_key(&key).is_none() {
                return Err(LedgerError::InvalidKey {
                    partition: "jobs",
                    key: String::from_utf8_lossy(&key).into_owned(),
                });
            }
            jobs.push(decode("job", &key, &value)?);
        }
        Ok(jobs)
    }

    fn events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        let prefix = encode_event_prefix(&job_id.to_string());
        let mut events = Vec::new();
        for item in self.events.prefix(prefix) {
            let (key, value) = item?;
            events.push(decode("event", &key, &value)?);
        }
        Ok(events)
    }
}

fn decode<T: DeserializeOwned>(record: &'static str, key: &[u8], value: &[u8]) -> Result<T> {
    serde_json::from_slice(value).map_err(|source| LedgerError::Corrupt {
        record,
        key: String::from_utf8_lossy(key).into_owned(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub job_count: usize,
    pub event_count: usize,
}
