//! Staging area for bytes passing through a node
//!
//! The coordinator terminates the client's transfer before it can start a
//! new one to a backend (and the other way round). Those bytes land here,
//! under a unique name per transfer, outside the namespace root.

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use super::error::StorageError;
use crate::error::Result;

/// Directory holding in-flight staged files
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the staging directory if absent
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;
        Ok(())
    }

    /// Reserve a unique path. `label` only contributes its file name.
    pub fn reserve(&self, label: &str) -> StagedFile {
        let base = Path::new(label)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "staged".to_string());
        StagedFile {
            path: self.dir.join(format!("{}-{base}", Uuid::new_v4())),
        }
    }
}

/// A staged file, removed when dropped
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now
    pub async fn discard(mut self) {
        let path = std::mem::take(&mut self.path);
        if let Err(e) = fs::remove_file(&path).await {
            log_removal_failure(&path, &e);
        }
    }
}

impl Drop for StagedFile {
    // Only reached when an operation bails out before `discard`. This is a
    // blocking unlink on the runtime thread, which is one metadata syscall.
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            log_removal_failure(&self.path, &e);
        }
    }
}

fn log_removal_failure(path: &Path, e: &std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove staged file");
    }
}
