//! Error types for the store engine

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem failures inside a namespace root
#[derive(Error, Debug)]
pub enum StorageError {
    /// Relative path would leave the namespace root
    #[error("path escapes the namespace root: {path}")]
    PathEscape { path: String },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Blocking filesystem worker died
    #[error("storage worker failed: {0}")]
    Worker(String),
}

/// Failures of the archiver
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Directory to archive does not exist
    #[error("archive source is not a directory: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("failed to write archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Blocking archive worker died
    #[error("archive worker failed: {0}")]
    Worker(String),
}
