//! Store engine bound to one namespace root

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use super::archive::{Archiver, TarGzArchiver};
use super::error::{ArchiveError, StorageError};
use super::listing::{Listing, PARTIAL_SUFFIX};
use crate::error::{Error, Result};
use crate::protocol::{ArchiveKind, ProtocolError};
use crate::transfer::{Channel, ChannelError, Received};

/// File storage under a namespace root.
///
/// Relative paths from the wire are joined under the root with leading `/`
/// ignored; a `..` component is refused rather than resolved.
#[derive(Debug, Clone)]
pub struct StoreEngine {
    root: PathBuf,
    archive_dir: PathBuf,
    archiver: Arc<dyn Archiver>,
}

impl StoreEngine {
    pub fn new(root: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_dir: archive_dir.into(),
            archiver: Arc::new(TarGzArchiver::new()),
        }
    }

    /// Replace the archiver
    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the namespace root and archive directory if absent
    pub async fn init(&self) -> Result<()> {
        for dir in [&self.root, &self.archive_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Map a wire path onto the filesystem
    pub fn resolve(&self, rel: &str) -> std::result::Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for component in Path::new(rel).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::ParentDir => {
                    return Err(StorageError::PathEscape {
                        path: rel.to_string(),
                    })
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        Ok(path)
    }

    /// Receive an upload of `size` bytes as `dest/name`.
    ///
    /// The body is always consumed, even when the file cannot be written.
    pub async fn put<S>(
        &self,
        channel: &mut Channel<S>,
        name: &str,
        size: u64,
        dest: &str,
    ) -> Result<PathBuf>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let path = match self.resolve(&format!("{dest}/{name}")) {
            Ok(path) => path,
            Err(e) => {
                channel.drain_sized().await?;
                return Err(e.into());
            }
        };

        receive_file(channel, &path, size).await?;
        tracing::info!(path = %path.display(), bytes = size, "stored file");
        Ok(path)
    }

    /// Open a stored file. `Ok(None)` when absent or not a regular file.
    pub async fn get(&self, rel: &str) -> Result<Option<(File, u64)>> {
        let path = self.resolve(rel)?;
        open_regular(&path).await
    }

    /// Stream a stored file to the peer, or announce not-found.
    pub async fn send_file<S>(&self, channel: &mut Channel<S>, rel: &str) -> Result<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opened = self.get(rel).await;
        send_opened(channel, opened, rel).await
    }

    /// Delete a stored file
    pub async fn remove(&self, rel: &str) -> Result<()> {
        let path = self.resolve(rel)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "removed file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::not_found(rel)),
            Err(source) => Err(StorageError::Delete { path, source }.into()),
        }
    }

    /// Recursive listing of `rel`
    pub async fn list(&self, rel: &str) -> Result<Listing> {
        let start = self.resolve(rel)?;
        let listing = tokio::task::spawn_blocking(move || Listing::walk(&start))
            .await
            .map_err(|e| StorageError::Worker(e.to_string()))??;
        Ok(listing)
    }

    /// Archive the whole namespace root as `<archive_dir>/<kind>.tar`
    pub async fn build_archive(&self, kind: ArchiveKind) -> Result<PathBuf> {
        let dest = self.archive_dir.join(kind.archive_name());
        let source = self.root.clone();
        let out = dest.clone();
        let archiver = Arc::clone(&self.archiver);

        tokio::task::spawn_blocking(move || archiver.create(&source, &out))
            .await
            .map_err(|e| ArchiveError::Worker(e.to_string()))??;

        tracing::info!(archive = %dest.display(), kind = %kind, "archive built");
        Ok(dest)
    }
}

/// Receive a sized transfer into `path`, creating parent directories.
///
/// Bytes land in a partial file beside `path` that replaces it only once the
/// full declared length has arrived. On failure the partial file is removed
/// and any earlier file at `path` is left as it was. The body is drained if
/// the partial file cannot be created.
pub async fn receive_file<S>(channel: &mut Channel<S>, path: &Path, expected: u64) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(dir) = path.parent() {
        if let Err(source) = fs::create_dir_all(dir).await {
            channel.drain_sized().await?;
            return Err(StorageError::CreateDir {
                path: dir.to_path_buf(),
                source,
            }
            .into());
        }
    }

    let partial = partial_path(path);
    let mut file = match File::create(&partial).await {
        Ok(file) => file,
        Err(source) => {
            channel.drain_sized().await?;
            return Err(StorageError::Create {
                path: partial,
                source,
            }
            .into());
        }
    };

    let received = channel.recv_sized(&mut file).await;
    drop(file);

    let failure: Error = match received {
        Ok(Received::Complete(n)) if n == expected => {
            return match fs::rename(&partial, path).await {
                Ok(()) => Ok(n),
                Err(source) => {
                    let _ = fs::remove_file(&partial).await;
                    Err(StorageError::Write {
                        path: path.to_path_buf(),
                        source,
                    }
                    .into())
                }
            };
        }
        Ok(Received::Complete(n)) => ProtocolError::SizeMismatch {
            declared: expected,
            announced: n,
        }
        .into(),
        Ok(Received::NotFound) => Error::not_found(path.display().to_string()),
        Err(ChannelError::Sink { source, .. }) => StorageError::Write {
            path: path.to_path_buf(),
            source,
        }
        .into(),
        Err(e) => e.into(),
    };

    let _ = fs::remove_file(&partial).await;
    Err(failure)
}

/// Unique sibling of `path` for an in-flight write
fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    path.with_file_name(format!(".{file_name}.{}{PARTIAL_SUFFIX}", Uuid::new_v4()))
}

/// Stream the file at `path` to the peer, or announce not-found.
pub async fn send_path<S>(channel: &mut Channel<S>, path: &Path) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let opened = open_regular(path).await;
    send_opened(channel, opened, &path.display().to_string()).await
}

async fn open_regular(path: &Path) -> Result<Option<(File, u64)>> {
    let open_err = |source| StorageError::Open {
        path: path.to_path_buf(),
        source,
    };

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(open_err(e).into()),
    };
    let meta = file.metadata().await.map_err(open_err)?;
    if !meta.is_file() {
        return Ok(None);
    }
    Ok(Some((file, meta.len())))
}

async fn send_opened<S>(
    channel: &mut Channel<S>,
    opened: Result<Option<(File, u64)>>,
    label: &str,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match opened {
        Ok(Some((file, len))) => Ok(channel.send_sized(len, file).await?),
        Ok(None) => {
            channel.send_not_found().await?;
            Err(Error::not_found(label))
        }
        Err(e) => {
            channel.send_not_found().await?;
            Err(e)
        }
    }
}
