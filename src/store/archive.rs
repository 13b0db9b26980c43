//! Archive creation
//!
//! The store engine only needs "bundle directory X into file Y". The
//! [`Archiver`] trait is that seam; [`TarGzArchiver`] is the implementation
//! every node uses by default.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use super::error::ArchiveError;

/// Produces an archive of a directory
pub trait Archiver: Send + Sync + fmt::Debug {
    /// Bundle `source` into `dest`, replacing any previous file at `dest`.
    ///
    /// Runs on a blocking thread.
    fn create(&self, source: &Path, dest: &Path) -> Result<(), ArchiveError>;
}

/// Gzip-compressed tar archiver
#[derive(Debug, Clone, Default)]
pub struct TarGzArchiver {
    compression: Compression,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_archive(&self, source: &Path, out: &Path) -> io::Result<()> {
        let file = File::create(out)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, self.compression));
        builder.follow_symlinks(false);

        let prefix = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        builder.append_dir_all(&prefix, source)?;

        let file = builder.into_inner()?.finish()?;
        file.sync_all()
    }
}

impl Archiver for TarGzArchiver {
    fn create(&self, source: &Path, dest: &Path) -> Result<(), ArchiveError> {
        if !source.is_dir() {
            return Err(ArchiveError::SourceMissing {
                path: source.to_path_buf(),
            });
        }

        let io_err = |source| ArchiveError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Build beside the destination, then rename over it.
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let partial = dest.with_file_name(format!(".{file_name}.{}.partial", Uuid::new_v4()));

        if let Err(e) = self.write_archive(source, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(io_err(e));
        }
        fs::rename(&partial, dest).map_err(io_err)?;

        tracing::debug!(
            source = %source.display(),
            archive = %dest.display(),
            "archive created"
        );
        Ok(())
    }
}
