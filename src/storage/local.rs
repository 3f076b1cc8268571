use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{
    already_moved, copy_verified, ensure_parent, io_error, log_move, Backend, Result,
    StorageAdapter, StorageError,
};

/// Local disk: moves are renames
#[derive(Debug, Clone)]
pub struct LocalStorage {
    temp_root: PathBuf,
}

impl LocalStorage {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    fn is_remote(&self, _target: &Path) -> bool {
        false
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

        match fs::rename(src, dest).await {
            Ok(()) => {
                log_move(Backend::Local, src, dest, None);
                Ok(dest.to_path_buf())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(src = %src.display(), dest = %dest.display(), "Rename crosses devices, copying");
                let bytes = copy_verified(src, dest).await?;
                log_move(Backend::Local, src, dest, Some(bytes));
                Ok(dest.to_path_buf())
            }
            Err(e) => Err(io_error(dest)(e)),
        }
    }
}
