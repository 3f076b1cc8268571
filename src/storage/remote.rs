use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{
    already_moved, copy_verified, ensure_parent, io_error, log_move, Backend, Result,
    StorageAdapter, StorageError,
};

/// Path fragments that mark a destination as network-attached
pub const DEFAULT_REMOTE_INDICATORS: &[&str] = &[
    "/volumes/",
    "/mnt/",
    "/media/",
    "nas",
    "network",
    "smb://",
    "nfs://",
];

/// Network-attached share: no renames across the wire, every move is copy, verify size,
/// then delete the local source
#[derive(Debug, Clone)]
pub struct RemoteStorage {
    temp_root: PathBuf,
    indicators: Vec<String>,
}

impl RemoteStorage {
    pub fn new(temp_root: impl Into<PathBuf>, indicators: Vec<String>) -> Self {
        Self {
            temp_root: temp_root.into(),
            indicators: indicators.into_iter().map(|i| i.to_lowercase()).collect(),
        }
    }

    pub fn with_default_indicators(temp_root: impl Into<PathBuf>) -> Self {
        Self::new(
            temp_root,
            DEFAULT_REMOTE_INDICATORS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

#[async_trait]
impl StorageAdapter for RemoteStorage {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    fn is_remote(&self, target: &Path) -> bool {
        let raw = target.to_string_lossy();
        if raw.starts_with(r"\\") {
            return true;
        }
        let path = raw.replace('\\', "/").to_lowercase();
        self.indicators.iter().any(|i| path.contains(i.as_str()))
    }

    async fn move_file(&self, src: &Path, dest: &Path) -> Result<PathBuf> {
        if already_moved(src, dest).await? {
            debug!(dest = %dest.display(), "Already moved");
            return Ok(dest.to_path_buf());
        }
        if !fs::try_exists(src).await.map_err(io_error(src))? {
            return Err(StorageError::SourceMissing(src.to_path_buf()));
        }
        ensure_parent(dest).await?;

        let bytes = copy_verified(src, dest).await?;
        log_move(Backend::Remote, src, dest, Some(bytes));
        Ok(dest.to_path_buf())
    }
}
