//! Storage backends for acquisition output
//!
//! Engine output always lands in a private local temp workspace first. Only after the
//! engine succeeds is it relocated to the destination through a [`StorageAdapter`]:
//! [`LocalStorage`] renames, [`RemoteStorage`] copies, verifies and deletes so a
//! dropped share never leaves a half-moved file looking complete.

mod local;
mod remote;

pub use local::LocalStorage;
pub use remote::{RemoteStorage, DEFAULT_REMOTE_INDICATORS};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::jobs::JobId;

/// Prefix of the marker file written by the write probe
pub const PROBE_PREFIX: &str = ".haulbox-write-probe-";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("size mismatch after copying to {path}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    Remote,
}

/// A destination and the backend that serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub path: PathBuf,
    pub backend: Backend,
}

impl StorageTarget {
    pub fn is_remote(&self) -> bool {
        self.backend == Backend::Remote
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    /// Local directory under which job workspaces are created
    fn temp_root(&self) -> &Path;

    fn is_remote(&self, target: &Path) -> bool;

    /// Relocate `src` to `dest`, returning the final path. Calling again after a
    /// successful move is a no-op that returns the same path.
    async fn move_file(&self, src: &Path, dest: &Path) -> Result<PathBuf>;

    /// Prove `target` is writable right now by creating and removing a marker file.
    /// Never errors; any failure is reported as `false`.
    async fn can_write_to(&self, target: &Path) -> bool {
        probe_writable(target).await
    }

    /// Create the job's private workspace under the local temp root
    async fn get_temp_processing_dir(&self, job_id: JobId) -> Result<PathBuf> {
        let dir = self.temp_root().join(job_id.to_string());
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
        debug!(job_id = %job_id, path = %dir.display(), "Created temp workspace");
        Ok(dir)
    }

    /// Best-effort recursive removal; `true` when nothing is left behind
    async fn cleanup_temp_dir(&self, path: &Path) -> bool {
        remove_dir_best_effort(path).await
    }
}

pub(crate) async fn probe_writable(target: &Path) -> bool {
    if let Err(e) = fs::create_dir_all(target).await {
        debug!(target = %target.display(), error = %e, "Write probe could not create directory");
        return false;
    }

    let probe = target.join(format!("{}{}", PROBE_PREFIX, Uuid::new_v4()));
    let attempt = async {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .await?;
        file.write_all(b"probe").await?;
        file.sync_all().await?;
        drop(file);

        let exists = fs::try_exists(&probe).await?;
        fs::remove_file(&probe).await?;
        Ok::<bool, io::Error>(exists)
    };

    match attempt.await {
        Ok(exists) => exists,
        Err(e) => {
            let _ = fs::remove_file(&probe).await;
            warn!(target = %target.display(), error = %e, "Write probe failed");
            false
        }
    }
}

pub(crate) async fn remove_dir_best_effort(path: &Path) -> bool {
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed temp workspace");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove temp workspace");
            false
        }
    }
}

/// Whether a previous call already moved `src` to `dest`. A leftover `src` whose size
/// matches `dest` is removed.
pub(crate) async fn already_moved(src: &Path, dest: &Path) -> Result<bool> {
    let dest_meta = match fs::metadata(dest).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_error(dest)(e)),
    };

    match fs::metadata(src).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(io_error(src)(e)),
        Ok(src_meta) if src_meta.len() == dest_meta.len() => {
            fs::remove_file(src).await.map_err(io_error(src))?;
            Ok(true)
        }
        Ok(src_meta) => {
            warn!(
                dest = %dest.display(),
                expected = src_meta.len(),
                found = dest_meta.len(),
                "Replacing destination with mismatched size"
            );
            Ok(false)
        }
    }
}

pub(crate) async fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    Ok(())
}

/// Copy, fsync, confirm the size, then delete the source. A partially written
/// destination is removed before the error is returned.
pub(crate) async fn copy_verified(src: &Path, dest: &Path) -> Result<u64> {
    let expected = fs::metadata(src).await.map_err(io_error(src))?.len();

    let copy = async {
        let mut reader = fs::File::open(src).await?;
        let mut writer = fs::File::create(dest).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.sync_all().await?;
        fs::metadata(dest).await.map(|m| m.len())
    };

    let actual = match copy.await {
        Ok(actual) => actual,
        Err(e) => {
            let _ = fs::remove_file(dest).await;
            return Err(io_error(dest)(e));
        }
    };

    if actual != expected {
        let _ = fs::remove_file(dest).await;
        return Err(StorageError::SizeMismatch {
            path: dest.to_path_buf(),
            expected,
            actual,
        });
    }

    fs::remove_file(src).await.map_err(io_error(src))?;
    Ok(actual)
}

/// Picks the adapter for a destination so callers never branch on the backend
#[derive(Clone)]
pub struct Storage {
    local: Arc<LocalStorage>,
    remote: Arc<RemoteStorage>,
}

impl Storage {
    pub fn new(temp_root: impl Into<PathBuf>, remote_indicators: Vec<String>) -> Self {
        let temp_root = temp_root.into();
        Self {
            local: Arc::new(LocalStorage::new(temp_root.clone())),
            remote: Arc::new(RemoteStorage::new(temp_root, remote_indicators)),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.temp_root.clone(), config.remote_indicators.clone())
    }

    pub fn temp_root(&self) -> &Path {
        self.local.temp_root()
    }

    pub fn resolve(&self, path: &Path) -> StorageTarget {
        let backend = if self.remote.is_remote(path) {
            Backend::Remote
        } else {
            Backend::Local
        };
        StorageTarget {
            path: path.to_path_buf(),
            backend,
        }
    }

    pub fn adapter(&self, target: &StorageTarget) -> Arc<dyn StorageAdapter> {
        match target.backend {
            Backend::Local => self.local.clone(),
            Backend::Remote => self.remote.clone(),
        }
    }

    /// Adapter for temp workspaces, which are always local
    pub fn workspace_adapter(&self) -> Arc<dyn StorageAdapter> {
        self.local.clone()
    }

    pub fn is_remote(&self, path: &Path) -> bool {
        self.remote.is_remote(path)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("temp_root", &self.local.temp_root())
            .finish()
    }
}

pub(crate) fn log_move(backend: Backend, src: &Path, dest: &Path, bytes: Option<u64>) {
    info!(
        backend = ?backend,
        src = %src.display(),
        dest = %dest.display(),
        bytes,
        "Moved file"
    );
}
