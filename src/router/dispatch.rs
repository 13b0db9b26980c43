//! Command execution for one node
//!
//! [`Router::execute`] runs everything between a command's acknowledgement
//! and its reply frame. Whatever happens, the exchange keeps the shape the
//! peer expects for that operation:
//!
//! | operation | after the command ack          |
//! |-----------|--------------------------------|
//! | upload    | sized transfer in (drained on failure) |
//! | download  | sized transfer out, or `-1`    |
//! | list      | sized transfer out, or `-1`    |
//! | archive   | sized transfer out, or `-1`    |
//! | delete    | nothing                        |
//!
//! The reply itself is written by the session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::rules::{Backend, RoutingRule, Target};
use crate::coordinator::backends::BackendPool;
use crate::coordinator::client::StoreClient;
use crate::error::{Error, Result};
use crate::protocol::{ArchiveKind, Command};
use crate::store::engine::{receive_file, send_path};
use crate::store::{Listing, StagedFile, StagingArea, StoreEngine};
use crate::transfer::Channel;

/// A boxed call made against a checked-out backend client
type BackendCall<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Executes commands against the local store or a backend
#[derive(Debug)]
pub struct Router {
    store: StoreEngine,
    staging: StagingArea,
    rule: Arc<dyn RoutingRule>,
    backends: Option<Arc<BackendPool>>,
    command_timeout: Option<Duration>,
}

impl Router {
    pub fn new(store: StoreEngine, staging: StagingArea, rule: Arc<dyn RoutingRule>) -> Self {
        Self {
            store,
            staging,
            rule,
            backends: None,
            command_timeout: None,
        }
    }

    /// Attach the backend connections used for forwarded operations
    pub fn with_backends(mut self, backends: Arc<BackendPool>) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Bound every forwarded backend operation
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn store(&self) -> &StoreEngine {
        &self.store
    }

    pub fn backends(&self) -> Option<&Arc<BackendPool>> {
        self.backends.as_ref()
    }

    /// Run `command`'s exchange on `channel` and return the reply message
    pub async fn execute<S>(&self, command: &Command, channel: &mut Channel<S>) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match command {
            Command::Upload { name, size, dest } => self.upload(channel, name, *size, dest).await,
            Command::Download { path } => self.download(channel, path).await,
            Command::Delete { path } => self.delete(path).await,
            Command::List { path } => self.list(channel, path).await,
            Command::Archive { kind } => self.archive(channel, *kind).await,
        }
    }

    async fn upload<S>(&self, channel: &mut Channel<S>, name: &str, size: u64, dest: &str) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let target = match self.rule.route_name(name) {
            Ok(target) => target,
            Err(e) => {
                channel.drain_sized().await?;
                return Err(e.into());
            }
        };

        match target {
            Target::Local => {
                self.store.put(channel, name, size, dest).await?;
            }
            Target::Backend(backend) => {
                let staged = self.staging.reserve(name);
                receive_file(channel, staged.path(), size).await?;

                let (name, dest, path) = (name.to_string(), dest.to_string(), staged.path().to_path_buf());
                let forwarded = self
                    .on_backend(backend, move |client| {
                        Box::pin(async move { client.upload_file(&name, &dest, &path).await })
                    })
                    .await;
                staged.discard().await;
                forwarded?;
            }
        }
        Ok("File uploaded successfully".to_string())
    }

    async fn download<S>(&self, channel: &mut Channel<S>, path: &str) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let target = match self.rule.route_name(path) {
            Ok(target) => target,
            Err(e) => {
                channel.send_not_found().await?;
                return Err(e.into());
            }
        };

        let bytes = match target {
            Target::Local => self.store.send_file(channel, path).await?,
            Target::Backend(backend) => {
                let staged = self.staging.reserve(path);
                let (rel, local) = (path.to_string(), staged.path().to_path_buf());
                let fetched = self
                    .on_backend(backend, move |client| {
                        Box::pin(async move {
                            let mut file = File::create(&local).await.map_err(|source| {
                                crate::store::StorageError::Create {
                                    path: local.clone(),
                                    source,
                                }
                            })?;
                            client.download(&rel, &mut file).await
                        })
                    })
                    .await;

                relay_staged(channel, staged, fetched).await?
            }
        };
        Ok(format!("File downloaded ({bytes} bytes)"))
    }

    async fn delete(&self, path: &str) -> Result<String> {
        match self.rule.route_name(path)? {
            Target::Local => self.store.remove(path).await?,
            Target::Backend(backend) => {
                let rel = path.to_string();
                self.on_backend(backend, move |client| {
                    Box::pin(async move { client.delete(&rel).await })
                })
                .await?;
            }
        }
        Ok("File removed".to_string())
    }

    async fn list<S>(&self, channel: &mut Channel<S>, path: &str) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let listing = match self.collect_listing(path).await {
            Ok(listing) => listing,
            Err(e) => {
                channel.send_not_found().await?;
                return Err(e);
            }
        };

        let text = listing.render();
        channel.send_sized(text.len() as u64, text.as_bytes()).await?;
        if listing.is_empty() {
            Ok("No files found".to_string())
        } else {
            Ok(format!("Listed {} file(s)", listing.len()))
        }
    }

    /// Local listing followed by each fan-out backend's, in rule order
    async fn collect_listing(&self, path: &str) -> Result<Listing> {
        let mut combined = self.store.list(path).await?;
        for &backend in self.rule.fan_out() {
            let rel = path.to_string();
            let remote = self
                .on_backend(backend, move |client| {
                    Box::pin(async move { client.list(&rel).await })
                })
                .await?;
            combined.append(Listing::parse(&remote));
        }
        Ok(combined)
    }

    async fn archive<S>(&self, channel: &mut Channel<S>, kind: ArchiveKind) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let bytes = match self.rule.route_archive(kind) {
            Target::Local => match self.store.build_archive(kind).await {
                Ok(archive) => send_path(channel, &archive).await?,
                Err(e) => {
                    channel.send_not_found().await?;
                    return Err(e);
                }
            },
            Target::Backend(backend) => {
                let staged = self.staging.reserve(&kind.archive_name());
                let local = staged.path().to_path_buf();
                let fetched = self
                    .on_backend(backend, move |client| {
                        Box::pin(async move {
                            let mut file = File::create(&local).await.map_err(|source| {
                                crate::store::StorageError::Create {
                                    path: local.clone(),
                                    source,
                                }
                            })?;
                            client.archive(kind, &mut file).await
                        })
                    })
                    .await;

                relay_staged(channel, staged, fetched).await?
            }
        };
        Ok(format!("Archive {} sent ({bytes} bytes)", kind.archive_name()))
    }

    /// Run `call` with exclusive use of `backend`'s connection.
    ///
    /// Errors come back attributed to the backend, except not-found which
    /// keeps its own category.
    async fn on_backend<T, F>(&self, backend: Backend, call: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut StoreClient<TcpStream>) -> BackendCall<'c, T>,
    {
        let pool = self
            .backends
            .as_ref()
            .ok_or_else(|| Error::backend(backend, Error::config("no backend connections")))?;
        let mut link = pool
            .checkout(backend)
            .await
            .map_err(|e| Error::backend(backend, e))?;

        tracing::debug!(backend = %backend, "forwarding to backend");
        let outcome = self.bounded(call(link.client())).await;
        link.release(&outcome);

        outcome.map_err(|e| match e {
            Error::NotFound { .. } => e,
            other => Error::backend(backend, other),
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout)?,
            None => call.await,
        }
    }
}

/// Send a file fetched from a backend on to the peer, or `-1` if the fetch
/// failed. The staged copy is removed either way.
async fn relay_staged<S>(channel: &mut Channel<S>, staged: StagedFile, fetched: Result<u64>) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sent = match fetched {
        Ok(_) => send_path(channel, staged.path()).await,
        Err(e) => match channel.send_not_found().await {
            Ok(()) => Err(e),
            Err(broken) => Err(broken.into()),
        },
    };
    staged.discard().await;
    sent
}
